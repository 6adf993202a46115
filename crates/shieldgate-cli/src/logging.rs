//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout stays parseable JSON. Filter priority,
//! highest first:
//!
//! 1. `SHIELDGATE_LOG` (directives, e.g. `shieldgate_core=debug`)
//! 2. `RUST_LOG`
//! 3. `-v` (debug) / `-q` (error)
//! 4. `warn`

use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    /// `-v` wins over `-q` when both are given.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    fn level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
        }
    }
}

pub fn init(verbosity: Verbosity) {
    let result = tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(verbosity == Verbosity::Verbose)
        .without_time()
        .try_init();
    if let Err(e) = result {
        eprintln!("warning: logging already initialised: {e}");
    }
}

fn build_filter(verbosity: Verbosity) -> EnvFilter {
    if let Ok(directives) = std::env::var("SHIELDGATE_LOG") {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(verbosity.level().as_str().to_ascii_lowercase())
}
