use clap::{Parser, Subcommand};

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "shieldgate", version, about = "Shieldgate CLI")]
struct Cli {
    /// Debug-level logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Restriction selection
    Select {
        #[command(subcommand)]
        action: commands::select::SelectAction,
    },
    /// Host callbacks
    Trigger {
        #[command(subcommand)]
        action: commands::trigger::TriggerAction,
    },
    /// Attention-task unlocks
    Unlock {
        #[command(subcommand)]
        action: commands::unlock::UnlockAction,
    },
    /// Revoke every active exemption now
    Lockdown,
    /// Unlock history
    Sessions {
        #[command(subcommand)]
        action: commands::sessions::SessionsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Current enforcement state
    Status,
}

fn main() {
    let cli = Cli::parse();
    logging::init(logging::Verbosity::from_flags(cli.verbose, cli.quiet));

    let result = match cli.command {
        Commands::Select { action } => commands::select::run(action),
        Commands::Trigger { action } => commands::trigger::run(action),
        Commands::Unlock { action } => commands::unlock::run(action),
        Commands::Lockdown => commands::lockdown::run(),
        Commands::Sessions { action } => commands::sessions::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Status => commands::status::run(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
