use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::target::RestrictionTarget;

/// One granted exemption. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockSession {
    pub target: RestrictionTarget,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Attention time the user actually completed to earn this session.
    pub completed_secs: u64,
}

impl UnlockSession {
    /// Create a session whose expiry is `granted_at + access_window`.
    pub fn new(
        target: RestrictionTarget,
        granted_at: DateTime<Utc>,
        access_window: Duration,
        completed_secs: u64,
    ) -> Self {
        Self {
            target,
            granted_at,
            expires_at: granted_at + access_window,
            completed_secs,
        }
    }

    /// Whether the exemption still grants access at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Access left at `now`, zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_exclusive() {
        let granted = DateTime::from_timestamp(1_000, 0).unwrap();
        let s = UnlockSession::new(
            RestrictionTarget::from_bytes(b"a".to_vec()),
            granted,
            Duration::seconds(900),
            60,
        );
        assert_eq!(s.expires_at, granted + Duration::seconds(900));
        assert!(s.is_active(granted + Duration::seconds(899)));
        assert!(!s.is_active(s.expires_at));
        assert_eq!(s.remaining(granted + Duration::seconds(600)), Duration::seconds(300));
        assert_eq!(s.remaining(granted + Duration::seconds(5_000)), Duration::zero());
    }
}
