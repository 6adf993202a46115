pub mod config;
pub mod lockdown;
pub mod select;
pub mod sessions;
pub mod status;
pub mod trigger;
pub mod unlock;

use std::error::Error;
use std::path::PathBuf;

use shieldgate_core::host::files::{ScheduleFile, ShieldFile};
use shieldgate_core::storage::{self, Config, PendingRequest, SessionStore, SharedStore};
use shieldgate_core::{ActuationError, EnforcementController, Event, ForegroundLauncher};

pub type CliResult = Result<(), Box<dyn Error>>;

pub type CliController = EnforcementController<ShieldFile, ScheduleFile>;

/// Stores and host files for one invocation.
pub struct Host {
    pub config: Config,
    pub data_dir: PathBuf,
}

impl Host {
    pub fn load() -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            config: Config::load()?,
            data_dir: storage::data_dir()?,
        })
    }

    pub fn shared(&self) -> Result<SharedStore, Box<dyn Error>> {
        let store = SharedStore::open(&self.data_dir.join("shared.db"))?
            .with_decode_failure(self.config.store.decode_failure);
        Ok(store)
    }

    pub fn sessions(&self) -> Result<SessionStore, Box<dyn Error>> {
        Ok(SessionStore::open(&self.data_dir.join("sessions.db"))?)
    }

    pub fn shield_file(&self) -> ShieldFile {
        ShieldFile::new(self.data_dir.join("shield.json"))
    }

    pub fn schedule_file(&self) -> Result<ScheduleFile, Box<dyn Error>> {
        Ok(ScheduleFile::new(self.data_dir.join("schedule.json"), self.shared()?))
    }

    pub fn controller(&self) -> Result<CliController, Box<dyn Error>> {
        Ok(EnforcementController::new(
            self.shared()?,
            self.sessions()?,
            &self.config.unlock,
            self.shield_file(),
            self.schedule_file()?,
        ))
    }
}

/// Tells whoever is watching the terminal to open the interactive context.
pub struct PrintLauncher;

impl ForegroundLauncher for PrintLauncher {
    fn request_foreground(&mut self, request: &PendingRequest) -> Result<(), ActuationError> {
        tracing::info!(token = %request.target, "interactive context requested");
        eprintln!("unlock requested for '{}'; run: shieldgate trigger interactive", request.hint);
        Ok(())
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_events(events: &[Event]) -> CliResult {
    print_json(&events)
}
