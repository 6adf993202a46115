//! TOML-based engine configuration.
//!
//! Stores:
//! - Unlock economics (access window, lookback window, tier durations)
//! - What to do when the stored selection cannot be decoded
//! - Session log retention
//! - The daily enforcement interval
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;

/// Upper bound for every duration setting: one year.
pub const MAX_DURATION_SECS: u64 = 365 * 86_400;

/// What a reader does with a selection payload it cannot decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeFailurePolicy {
    /// Treat it as "no selection": restrictions are lifted until the user
    /// saves again.
    #[default]
    FailOpen,
    /// Re-assert the last selection that decoded successfully.
    FailClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockConfig {
    #[serde(default = "default_access_window_secs")]
    pub access_window_secs: u64,
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,
    /// Required attention time per escalation tier. The last entry applies
    /// to every tier beyond the table.
    #[serde(default = "default_tier_durations_secs")]
    pub tier_durations_secs: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub decode_failure: DecodeFailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Extra history kept beyond the lookback window before pruning.
    #[serde(default = "default_prune_margin_secs")]
    pub prune_margin_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// `HH:MM`, local to the host scheduler.
    #[serde(default = "default_interval_start")]
    pub interval_start: String,
    #[serde(default = "default_interval_end")]
    pub interval_end: String,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub unlock: UnlockConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

fn default_access_window_secs() -> u64 {
    900
}
fn default_lookback_secs() -> u64 {
    3600
}
fn default_tier_durations_secs() -> Vec<u64> {
    vec![60, 180, 300]
}
fn default_prune_margin_secs() -> u64 {
    86_400
}
fn default_interval_start() -> String {
    "00:00".into()
}
fn default_interval_end() -> String {
    "23:59".into()
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            access_window_secs: default_access_window_secs(),
            lookback_secs: default_lookback_secs(),
            tier_durations_secs: default_tier_durations_secs(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            prune_margin_secs: default_prune_margin_secs(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_start: default_interval_start(),
            interval_end: default_interval_end(),
        }
    }
}

impl UnlockConfig {
    pub fn access_window(&self) -> Duration {
        bounded_secs(self.access_window_secs)
    }

    pub fn lookback(&self) -> Duration {
        bounded_secs(self.lookback_secs)
    }
}

impl SessionsConfig {
    pub fn prune_margin(&self) -> Duration {
        bounded_secs(self.prune_margin_secs)
    }
}

/// Clamped to [`MAX_DURATION_SECS`]; a validated config is never clamped.
fn bounded_secs(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

impl ScheduleConfig {
    pub fn start_time(&self) -> Result<NaiveTime, ConfigError> {
        parse_hhmm("schedule.interval_start", &self.interval_start)
    }

    pub fn end_time(&self) -> Result<NaiveTime, ConfigError> {
        parse_hhmm("schedule.interval_end", &self.interval_end)
    }
}

fn parse_hhmm(key: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected HH:MM, got '{value}': {e}"),
    })
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }
        key.split('.').try_fold(root, |current, part| current.get(part))
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let (parent_path, leaf) = match key.rsplit_once('.') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, key),
        };
        if leaf.is_empty() {
            return Err(unknown());
        }

        let mut parent = root;
        if let Some(path) = parent_path {
            for part in path.split('.') {
                parent = parent.get_mut(part).ok_or_else(unknown)?;
            }
        }
        let obj = parent.as_object_mut().ok_or_else(unknown)?;
        let existing = obj.get(leaf).ok_or_else(unknown)?;

        let new_value = match existing {
            serde_json::Value::Bool(_) => serde_json::Value::Bool(
                value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
            ),
            serde_json::Value::Number(_) => serde_json::Value::Number(
                value
                    .parse::<u64>()
                    .map_err(|_| invalid(format!("cannot parse '{value}' as a number")))?
                    .into(),
            ),
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
            }
            _ => serde_json::Value::String(value.into()),
        };

        obj.insert(leaf.to_string(), new_value);
        Ok(())
    }

    /// Default location: `<data_dir>/config.toml`.
    pub fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("config.toml"),
                message: e.to_string(),
            })
    }

    /// Load from the default location, writing defaults if absent.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed or fails
    /// validation, or if the defaults cannot be written.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        match Self::get_json_value_by_path(&json, key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key and validate the result. Does not save.
    ///
    /// # Errors
    /// Returns an error if the key is unknown, the value does not parse, or
    /// the resulting configuration is invalid. `self` is untouched on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Check invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        let too_long = format!("must be at most {MAX_DURATION_SECS} seconds");

        for (key, secs) in [
            ("unlock.access_window_secs", self.unlock.access_window_secs),
            ("unlock.lookback_secs", self.unlock.lookback_secs),
        ] {
            if secs == 0 {
                return Err(invalid(key, "must be positive"));
            }
            if secs > MAX_DURATION_SECS {
                return Err(invalid(key, too_long.as_str()));
            }
        }
        if self.sessions.prune_margin_secs > MAX_DURATION_SECS {
            return Err(invalid("sessions.prune_margin_secs", too_long.as_str()));
        }
        let tiers = &self.unlock.tier_durations_secs;
        if tiers.is_empty() {
            return Err(invalid("unlock.tier_durations_secs", "must not be empty"));
        }
        if tiers.iter().any(|&secs| secs > MAX_DURATION_SECS) {
            return Err(invalid("unlock.tier_durations_secs", too_long.as_str()));
        }
        if tiers.len() > usize::from(u8::MAX) {
            return Err(invalid("unlock.tier_durations_secs", "too many tiers"));
        }
        if tiers.windows(2).any(|w| w[1] < w[0]) {
            return Err(invalid("unlock.tier_durations_secs", "must be non-decreasing"));
        }
        self.schedule.start_time()?;
        self.schedule.end_time()?;
        Ok(())
    }
}
