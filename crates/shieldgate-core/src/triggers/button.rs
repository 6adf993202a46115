use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::events::Event;
use crate::host::ForegroundLauncher;
use crate::storage::SharedStore;
use crate::target::RestrictionTarget;

/// The overlay's unlock button was pressed.
///
/// Makes no enforcement decision. The request is published first so a
/// launcher failure still leaves it for the next time the interactive
/// context opens.
pub fn on_press<L: ForegroundLauncher>(
    shared: &SharedStore,
    launcher: &mut L,
    target: &RestrictionTarget,
    hint: &str,
    now: DateTime<Utc>,
) -> Result<Event> {
    let request = shared.publish_pending_request(target, hint, now)?;
    if let Err(e) = launcher.request_foreground(&request) {
        tracing::warn!(token = %target, error = %e, "could not open interactive context");
    }
    tracing::info!(token = %target, "unlock requested");
    Ok(Event::UnlockRequested {
        target: request.target,
        hint: request.hint,
        at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryLauncher;

    #[test]
    fn publishes_then_launches() {
        let shared = SharedStore::open_memory().unwrap();
        let mut launcher = MemoryLauncher::new();
        let target = RestrictionTarget::from_bytes(b"video".to_vec());
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let event = on_press(&shared, &mut launcher, &target, "Video", now).unwrap();
        assert!(matches!(event, Event::UnlockRequested { .. }));
        assert_eq!(launcher.requests().len(), 1);
        assert_eq!(launcher.requests()[0].hint, "Video");

        let pending = shared.peek_pending_request().unwrap().unwrap();
        assert_eq!(pending.target, target);
    }
}
