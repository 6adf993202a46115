use chrono::{DateTime, Utc};

use crate::enforcement::EnforcementController;
use crate::error::Result;
use crate::events::Event;
use crate::host::{HostScheduler, RestrictionSurface};
use crate::target::RestrictionTarget;

/// A usage-threshold watch fired.
///
/// The watch only says "look again"; which targets are still exempt is
/// re-derived from the session log, so a late or duplicate callback is
/// harmless.
pub fn on_reached<S, H>(
    controller: &mut EnforcementController<S, H>,
    target: Option<&RestrictionTarget>,
    now: DateTime<Utc>,
) -> Result<Event>
where
    S: RestrictionSurface,
    H: HostScheduler,
{
    match target {
        Some(target) => tracing::debug!(token = %target, "usage threshold reached"),
        None => tracing::debug!("usage threshold reached"),
    }
    controller.apply_enforcement(now)
}
