use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::target::RestrictionTarget;

/// Every engine decision produces an Event.
/// Hosts log or display them; the CLI prints them as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The restriction surface now shields exactly `restricted_count` entries.
    EnforcementApplied {
        restricted_count: usize,
        exempt: Vec<RestrictionTarget>,
        at: DateTime<Utc>,
    },
    /// Nothing left to restrict; the rule was removed.
    EnforcementCleared {
        exempt: Vec<RestrictionTarget>,
        at: DateTime<Utc>,
    },
    /// The computed actuation matched the last one; no call was made.
    EnforcementUnchanged {
        at: DateTime<Utc>,
    },
    /// The host rejected the actuation. The next invocation retries.
    ActuationFailed {
        reason: String,
        at: DateTime<Utc>,
    },
    ExemptionGranted {
        target: RestrictionTarget,
        tier: u8,
        required_secs: u64,
        completed_secs: u64,
        granted_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    /// Reported attention time fell short of the current tier.
    ExemptionDenied {
        target: RestrictionTarget,
        tier: u8,
        required_secs: u64,
        completed_secs: u64,
        at: DateTime<Utc>,
    },
    /// Every active exemption was revoked.
    AllRelocked {
        revoked: Vec<RestrictionTarget>,
        at: DateTime<Utc>,
    },
    /// The overlay asked for an unlock; the interactive context was signalled.
    UnlockRequested {
        target: RestrictionTarget,
        hint: String,
        at: DateTime<Utc>,
    },
    /// The interactive context should run an attention task of this length.
    UnlockPrompt {
        target: RestrictionTarget,
        hint: String,
        tier: u8,
        required_secs: u64,
        at: DateTime<Utc>,
    },
    SelectionChanged {
        entries: usize,
        dropped: Vec<RestrictionTarget>,
        at: DateTime<Utc>,
    },
    SessionsPruned {
        deleted: usize,
        before: DateTime<Utc>,
        at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let at = DateTime::from_timestamp(0, 0).unwrap();
        let json = serde_json::to_value(Event::EnforcementUnchanged { at }).unwrap();
        assert_eq!(json["type"], "EnforcementUnchanged");
    }
}
