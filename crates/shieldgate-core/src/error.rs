//! Core error types for shieldgate-core.
//!
//! Every fallible engine operation returns [`CoreError`]. Decode failures and
//! store contention never surface here: the former degrade to an empty or
//! absent value (and are logged), the latter is resolved by last-writer-wins.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for shieldgate-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Durable store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The host rejected an actuation or registration call
    #[error("Actuation error: {0}")]
    Actuation(#[from] ActuationError),

    /// The caller reported less attention time than the current tier requires
    #[error("Not yet eligible: {0}")]
    Policy(#[from] PolicyViolation),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the database file
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Store migration failed: {0}")]
    MigrationFailed(String),

    /// Another process holds the write lock past the busy timeout
    #[error("Store is locked")]
    Locked,

    /// Payload could not be encoded for storage
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// Filesystem errors while locating the data directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dotted key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Host surface errors (restriction surface, scheduler, foreground launcher).
#[derive(Error, Debug)]
pub enum ActuationError {
    /// The host refused the call
    #[error("{surface} rejected the call: {message}")]
    Rejected {
        surface: &'static str,
        message: String,
    },

    /// Host state file could not be written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Registrations could not be kept in the shared store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Host state file could not be encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// An exemption was requested with less completed attention time than required.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("completed {completed_secs}s but tier {tier} requires {required_secs}s")]
pub struct PolicyViolation {
    pub required_secs: u64,
    pub completed_secs: u64,
    pub tier: u8,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StoreError::Locked
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Store(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_sqlite_maps_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(StoreError::from(err), StoreError::Locked));
    }

    #[test]
    fn policy_violation_message_names_both_durations() {
        let err = CoreError::from(PolicyViolation {
            required_secs: 180,
            completed_secs: 60,
            tier: 1,
        });
        assert_eq!(
            err.to_string(),
            "Not yet eligible: completed 60s but tier 1 requires 180s"
        );
    }
}
