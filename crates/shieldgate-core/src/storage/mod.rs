mod config;
pub mod migrations;
pub mod sessions;
pub mod shared;

pub use config::{
    Config, DecodeFailurePolicy, ScheduleConfig, SessionsConfig, StoreConfig, UnlockConfig,
};
pub use sessions::{DailyUsage, SessionStore};
pub use shared::{PendingRequest, ScheduleChange, SharedStore};

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use crate::error::StoreError;

/// How long a writer waits on another process's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns the shared data directory.
///
/// `SHIELDGATE_DATA_DIR` wins outright. Otherwise `~/.config/shieldgate`, or
/// `~/.config/shieldgate-dev` when `SHIELDGATE_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("SHIELDGATE_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("SHIELDGATE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("shieldgate-dev")
            } else {
                base_dir.join("shieldgate")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Open a connection that tolerates other processes holding the same file.
///
/// WAL lets readers proceed while a writer commits, and the busy timeout
/// turns short write contention into waiting instead of an error.
pub(crate) fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!(path = %path.display(), journal_mode = %mode, "opened store");
    Ok(conn)
}
