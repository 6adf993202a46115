//! The interactive context: runs the attention task and reports back.

use chrono::{DateTime, Utc};

use crate::enforcement::EnforcementController;
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::host::{HostScheduler, RestrictionSurface};
use crate::target::RestrictionTarget;

/// Take the pending request, if any, and say how long the task must run.
///
/// The request is consumed here; a second foreground without a new button
/// press returns `None`.
pub fn on_foreground<S, H>(
    controller: &EnforcementController<S, H>,
    now: DateTime<Utc>,
) -> Result<Option<Event>>
where
    S: RestrictionSurface,
    H: HostScheduler,
{
    let Some(request) = controller.shared().consume_pending_request()? else {
        tracing::debug!("no pending unlock request");
        return Ok(None);
    };
    let requirement = controller.requirement(&request.target, now)?;
    tracing::info!(
        token = %request.target,
        tier = requirement.tier.as_u8(),
        required_secs = requirement.required_secs,
        "prompting for attention task"
    );
    Ok(Some(Event::UnlockPrompt {
        target: request.target,
        hint: request.hint,
        tier: requirement.tier.as_u8(),
        required_secs: requirement.required_secs,
        at: now,
    }))
}

/// The attention task finished after `completed_secs`.
///
/// A short report comes back as [`Event::ExemptionDenied`] rather than an
/// error so the UI can show "not yet eligible".
pub fn report_completed<S, H>(
    controller: &mut EnforcementController<S, H>,
    target: &RestrictionTarget,
    completed_secs: u64,
    now: DateTime<Utc>,
) -> Result<Vec<Event>>
where
    S: RestrictionSurface,
    H: HostScheduler,
{
    match controller.grant_exemption(target, completed_secs, now) {
        Ok(events) => Ok(events),
        Err(CoreError::Policy(violation)) => Ok(vec![Event::ExemptionDenied {
            target: target.clone(),
            tier: violation.tier,
            required_secs: violation.required_secs,
            completed_secs: violation.completed_secs,
            at: now,
        }]),
        Err(e) => Err(e),
    }
}
