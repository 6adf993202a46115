//! Escalating unlock cost.
//!
//! The more often a target has been unlocked recently, the longer the next
//! attention task has to run.
//!
//! ## Tiers
//!
//! Counted over `(now - lookback, now]` by grant time, per target:
//!
//! - **Tier 0**: no recent unlocks, 60s
//! - **Tier 1**: one recent unlock, 180s
//! - **Tier 2+**: two or more, 300s
//!
//! A session granted 59 minutes ago still counts even though its access
//! window closed long ago. History for one target never raises the cost of
//! another.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::UnlockSession;
use crate::error::StoreError;
use crate::storage::{SessionStore, UnlockConfig};
use crate::target::RestrictionTarget;

/// Index into the tier table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EscalationTier(u8);

impl EscalationTier {
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Tier for a recent-unlock count, saturating at `max`.
    pub fn from_count(count: usize, max: u8) -> Self {
        Self(count.min(usize::from(max)) as u8)
    }
}

/// What the next unlock costs, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRequirement {
    pub tier: EscalationTier,
    pub recent_unlocks: usize,
    pub required_secs: u64,
}

#[derive(Debug, Clone)]
pub struct UnlockEscalationPolicy {
    lookback: Duration,
    tier_durations_secs: Vec<u64>,
}

impl Default for UnlockEscalationPolicy {
    fn default() -> Self {
        Self::from_config(&UnlockConfig::default())
    }
}

impl UnlockEscalationPolicy {
    /// Build from validated configuration. An empty tier table degrades to
    /// a single zero-length tier.
    pub fn from_config(config: &UnlockConfig) -> Self {
        let mut tier_durations_secs = config.tier_durations_secs.clone();
        if tier_durations_secs.is_empty() {
            tier_durations_secs.push(0);
        }
        Self {
            lookback: config.lookback(),
            tier_durations_secs,
        }
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    fn max_tier(&self) -> u8 {
        (self.tier_durations_secs.len() - 1).min(usize::from(u8::MAX)) as u8
    }

    /// Exclusive lower bound of the escalation window at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.lookback
    }

    /// Map a recent-unlock count to its requirement.
    pub fn requirement_for_count(&self, recent_unlocks: usize) -> UnlockRequirement {
        let tier = EscalationTier::from_count(recent_unlocks, self.max_tier());
        UnlockRequirement {
            tier,
            recent_unlocks,
            required_secs: self.tier_durations_secs[usize::from(tier.as_u8())],
        }
    }

    /// Requirement derived from a slice of history. Sessions for other
    /// targets and sessions outside `(now - lookback, now]` are ignored.
    pub fn requirement_from_history(
        &self,
        target: &RestrictionTarget,
        history: &[UnlockSession],
        now: DateTime<Utc>,
    ) -> UnlockRequirement {
        let since = self.window_start(now);
        let recent = history
            .iter()
            .filter(|s| &s.target == target && s.granted_at > since && s.granted_at <= now)
            .count();
        self.requirement_for_count(recent)
    }

    /// Requirement for the next unlock of `target`, read from the session log.
    pub fn requirement(
        &self,
        sessions: &SessionStore,
        target: &RestrictionTarget,
        now: DateTime<Utc>,
    ) -> Result<UnlockRequirement, StoreError> {
        let history = sessions.recent_sessions(target, self.window_start(now))?;
        Ok(self.requirement_from_history(target, &history, now))
    }

    /// Required attention time in seconds for the next unlock of `target`.
    pub fn required_duration(
        &self,
        sessions: &SessionStore,
        target: &RestrictionTarget,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self.requirement(sessions, target, now)?.required_secs)
    }

    /// Oldest grant time that may be pruned without changing any requirement.
    ///
    /// Always at or before the start of the escalation window.
    pub fn prune_cutoff(&self, now: DateTime<Utc>, margin: Duration) -> DateTime<Utc> {
        self.window_start(now) - margin.max(Duration::zero())
    }
}
