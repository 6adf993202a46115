//! Seams to the host platform.
//!
//! The engine never blocks anything itself. It tells a [`RestrictionSurface`]
//! what to shield, asks a [`HostScheduler`] for callbacks, and asks a
//! [`ForegroundLauncher`] to bring up the interactive context. Hosts
//! implement these; [`memory`] has in-process recorders and [`files`] has
//! the file-backed surfaces used by the CLI.

pub mod files;
pub mod memory;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ActuationError;
use crate::selection::RestrictionSelection;
use crate::storage::PendingRequest;
use crate::target::RestrictionTarget;

/// One actuation call against the restriction surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actuation {
    /// Shield exactly these targets.
    Restrict { restricted: RestrictionSelection },
    /// Remove the rule entirely.
    Clear,
}

impl Actuation {
    /// `Clear` for an empty set. Some hosts treat an empty-but-present rule
    /// differently from no rule, so an empty set is never sent as a rule.
    pub fn for_restricted(restricted: RestrictionSelection) -> Self {
        if restricted.is_empty() {
            Actuation::Clear
        } else {
            Actuation::Restrict { restricted }
        }
    }

    pub fn restricted(&self) -> Option<&RestrictionSelection> {
        match self {
            Actuation::Restrict { restricted } => Some(restricted),
            Actuation::Clear => None,
        }
    }
}

/// The host mechanism that visibly blocks targets.
///
/// Each method is a single, whole-set call. Implementations either apply
/// it or return an error; the engine does not retry.
pub trait RestrictionSurface {
    fn set_restricted(&mut self, restricted: &RestrictionSelection) -> Result<(), ActuationError>;

    fn clear_restricted(&mut self) -> Result<(), ActuationError>;

    fn actuate(&mut self, actuation: &Actuation) -> Result<(), ActuationError> {
        match actuation {
            Actuation::Restrict { restricted } => self.set_restricted(restricted),
            Actuation::Clear => self.clear_restricted(),
        }
    }

    /// The rule currently in place, for surfaces that can report it.
    /// `None` means unknown, and the next decision is always actuated.
    fn current(&self) -> Result<Option<Actuation>, ActuationError> {
        Ok(None)
    }
}

/// The recurring daily enforcement interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyInterval {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// "Call back when `target` has been used for `threshold_secs`."
///
/// Registered on every grant so an exemption still ends if the process
/// holding the relock timer is killed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageThresholdWatch {
    pub target: RestrictionTarget,
    pub threshold_secs: u64,
    pub registered_at: DateTime<Utc>,
}

/// Everything registered with the host scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRegistrations {
    #[serde(default)]
    pub daily_interval: Option<DailyInterval>,
    #[serde(default)]
    pub usage_watches: Vec<UsageThresholdWatch>,
}

/// Host callbacks that drive the trigger surfaces.
pub trait HostScheduler {
    fn register_daily_interval(&mut self, interval: &DailyInterval) -> Result<(), ActuationError>;

    fn register_usage_threshold(&mut self, watch: &UsageThresholdWatch) -> Result<(), ActuationError>;

    fn cancel_usage_threshold(&mut self, target: &RestrictionTarget) -> Result<(), ActuationError>;
}

/// Brings up the context that can run the attention task.
pub trait ForegroundLauncher {
    fn request_foreground(&mut self, request: &PendingRequest) -> Result<(), ActuationError>;
}

impl<T: RestrictionSurface + ?Sized> RestrictionSurface for Box<T> {
    fn set_restricted(&mut self, restricted: &RestrictionSelection) -> Result<(), ActuationError> {
        (**self).set_restricted(restricted)
    }

    fn clear_restricted(&mut self) -> Result<(), ActuationError> {
        (**self).clear_restricted()
    }

    fn current(&self) -> Result<Option<Actuation>, ActuationError> {
        (**self).current()
    }
}

impl<T: HostScheduler + ?Sized> HostScheduler for Box<T> {
    fn register_daily_interval(&mut self, interval: &DailyInterval) -> Result<(), ActuationError> {
        (**self).register_daily_interval(interval)
    }

    fn register_usage_threshold(&mut self, watch: &UsageThresholdWatch) -> Result<(), ActuationError> {
        (**self).register_usage_threshold(watch)
    }

    fn cancel_usage_threshold(&mut self, target: &RestrictionTarget) -> Result<(), ActuationError> {
        (**self).cancel_usage_threshold(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetKind;

    #[test]
    fn empty_set_becomes_clear() {
        assert_eq!(
            Actuation::for_restricted(RestrictionSelection::new()),
            Actuation::Clear
        );
        let sel = RestrictionSelection::new()
            .with(TargetKind::App, RestrictionTarget::from_bytes(b"a".to_vec()));
        assert_eq!(
            Actuation::for_restricted(sel.clone()).restricted(),
            Some(&sel)
        );
    }
}
