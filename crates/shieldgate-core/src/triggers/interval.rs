use chrono::{DateTime, Duration, Utc};

use crate::enforcement::EnforcementController;
use crate::error::{ActuationError, ConfigError, Result};
use crate::events::Event;
use crate::host::{DailyInterval, HostScheduler, RestrictionSurface};
use crate::storage::Config;

/// Daily interval boundaries.
///
/// Both boundaries re-apply enforcement. The end of the interval never
/// clears restrictions; it only adds a history maintenance pass.
#[derive(Debug, Clone)]
pub struct IntervalTrigger {
    interval: DailyInterval,
    prune_margin: Duration,
}

impl IntervalTrigger {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            interval: DailyInterval {
                start: config.schedule.start_time()?,
                end: config.schedule.end_time()?,
            },
            prune_margin: config.sessions.prune_margin(),
        })
    }

    pub fn interval(&self) -> &DailyInterval {
        &self.interval
    }

    /// Register the daily interval with the host scheduler.
    pub fn install<H: HostScheduler>(&self, scheduler: &mut H) -> Result<(), ActuationError> {
        scheduler.register_daily_interval(&self.interval)?;
        tracing::info!(
            start = %self.interval.start,
            end = %self.interval.end,
            "installed daily interval"
        );
        Ok(())
    }

    pub fn on_start<S, H>(
        &self,
        controller: &mut EnforcementController<S, H>,
        now: DateTime<Utc>,
    ) -> Result<Event>
    where
        S: RestrictionSurface,
        H: HostScheduler,
    {
        tracing::debug!("interval started");
        controller.apply_enforcement(now)
    }

    pub fn on_end<S, H>(
        &self,
        controller: &mut EnforcementController<S, H>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>>
    where
        S: RestrictionSurface,
        H: HostScheduler,
    {
        tracing::debug!("interval ended");
        let applied = controller.apply_enforcement(now)?;
        let pruned = controller.prune_history(self.prune_margin, now)?;
        Ok(vec![applied, pruned])
    }
}
