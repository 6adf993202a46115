//! File-backed host surfaces.
//!
//! A standalone host (the CLI, a cron-driven daemon) has no OS shield API,
//! so it publishes decisions as JSON files that a blocker (DNS filter,
//! firewall rule generator, launcher wrapper) consumes.
//!
//! - `shield.json`: the actuated restriction set, absent when cleared
//! - `schedule.json`: the daily interval and usage-threshold watches,
//!   republished from the shared store on every change
//!
//! Both are replaced by write-to-temp then rename, so readers see either the
//! old file or the new one.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{
    Actuation, DailyInterval, HostScheduler, RestrictionSurface, ScheduleRegistrations,
    UsageThresholdWatch,
};
use crate::error::ActuationError;
use crate::selection::RestrictionSelection;
use crate::storage::{ScheduleChange, SharedStore};
use crate::target::RestrictionTarget;

/// Replace `path` atomically with `contents`.
///
/// The temp file lives next to `path` so the rename stays on one filesystem,
/// and it is removed if any step fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, ActuationError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Contents of `shield.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldState {
    pub restricted: RestrictionSelection,
    pub applied_at: DateTime<Utc>,
}

/// Restriction surface that writes `shield.json`.
#[derive(Debug, Clone)]
pub struct ShieldFile {
    path: PathBuf,
}

impl ShieldFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current shield state; `None` when no rule is in place.
    pub fn read(&self) -> Result<Option<ShieldState>, ActuationError> {
        read_json(&self.path)
    }
}

impl RestrictionSurface for ShieldFile {
    fn set_restricted(&mut self, restricted: &RestrictionSelection) -> Result<(), ActuationError> {
        let state = ShieldState {
            restricted: restricted.clone(),
            applied_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&state)?;
        write_atomic(&self.path, &json)?;
        Ok(())
    }

    fn clear_restricted(&mut self) -> Result<(), ActuationError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// An absent file is a cleared rule.
    fn current(&self) -> Result<Option<Actuation>, ActuationError> {
        let actuation = match self.read()? {
            Some(state) => Actuation::for_restricted(state.restricted),
            None => Actuation::Clear,
        };
        Ok(Some(actuation))
    }
}

/// Scheduler that keeps registrations in the shared store and publishes
/// them to `schedule.json` for an external timer service.
///
/// The store is the source of truth. Each change rewrites the whole file
/// under the store's write lock, so concurrent processes never drop each
/// other's watches and a damaged file is repaired by the next change.
pub struct ScheduleFile {
    path: PathBuf,
    store: SharedStore,
}

impl ScheduleFile {
    pub fn new(path: impl Into<PathBuf>, store: SharedStore) -> Self {
        Self {
            path: path.into(),
            store,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registrations as last published; `None` before the first change.
    ///
    /// # Errors
    /// Returns an error if the file exists but does not decode.
    pub fn read(&self) -> Result<Option<ScheduleRegistrations>, ActuationError> {
        read_json(&self.path)
    }

    /// Registrations as recorded in the shared store.
    pub fn registrations(&self) -> Result<ScheduleRegistrations, ActuationError> {
        Ok(self.store.schedule()?)
    }

    fn update(&self, change: ScheduleChange<'_>) -> Result<(), ActuationError> {
        self.store.update_schedule(change, |registrations| {
            let json = serde_json::to_vec_pretty(registrations)?;
            write_atomic(&self.path, &json)?;
            Ok::<_, ActuationError>(())
        })?;
        Ok(())
    }
}

impl HostScheduler for ScheduleFile {
    fn register_daily_interval(&mut self, interval: &DailyInterval) -> Result<(), ActuationError> {
        self.update(ScheduleChange::DailyInterval(interval))
    }

    fn register_usage_threshold(&mut self, watch: &UsageThresholdWatch) -> Result<(), ActuationError> {
        self.update(ScheduleChange::Watch(watch))
    }

    fn cancel_usage_threshold(&mut self, target: &RestrictionTarget) -> Result<(), ActuationError> {
        self.update(ScheduleChange::Unwatch(target))
    }
}
