//! Enforcement controller.
//!
//! Decides what the host should shield and pushes it in one call. There is
//! no authoritative in-memory state: every operation re-derives the
//! restricted set from the stored selection, the session log and `now`, so
//! any process the host spawns reaches the same answer.
//!
//! ## Per-target states
//!
//! ```text
//! Restricted --(task completed)--> Exempt(expiry)
//! Exempt --(relock timer | now >= expiry | relock all)--> Restricted
//! either --(dropped from selection)--> untracked
//! ```

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::relock::RelockTimer;
use crate::error::{PolicyViolation, Result};
use crate::events::Event;
use crate::host::{Actuation, HostScheduler, RestrictionSurface, UsageThresholdWatch};
use crate::selection::RestrictionSelection;
use crate::storage::{PendingRequest, SessionStore, SharedStore, UnlockConfig};
use crate::target::RestrictionTarget;
use crate::unlock::{UnlockEscalationPolicy, UnlockRequirement, UnlockSession};

/// One active exemption, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExemptionStatus {
    pub target: RestrictionTarget,
    pub expires_at: DateTime<Utc>,
    pub remaining_secs: i64,
}

/// Everything the engine derives at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementSnapshot {
    pub selection: RestrictionSelection,
    pub exempt: Vec<ExemptionStatus>,
    pub actuation: Actuation,
    pub pending_request: Option<PendingRequest>,
    pub at: DateTime<Utc>,
}

pub struct EnforcementController<S, H> {
    shared: SharedStore,
    sessions: SessionStore,
    policy: UnlockEscalationPolicy,
    access_window: Duration,
    surface: S,
    scheduler: H,
    relock: RelockTimer,
    /// Last actuation the surface accepted, seeded from what the surface
    /// reports when this process has not actuated yet.
    last_actuation: Option<Actuation>,
}

impl<S: RestrictionSurface, H: HostScheduler> EnforcementController<S, H> {
    pub fn new(
        shared: SharedStore,
        sessions: SessionStore,
        unlock: &UnlockConfig,
        surface: S,
        scheduler: H,
    ) -> Self {
        Self {
            shared,
            sessions,
            policy: UnlockEscalationPolicy::from_config(unlock),
            access_window: unlock.access_window(),
            surface,
            scheduler,
            relock: RelockTimer::new(),
            last_actuation: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn shared(&self) -> &SharedStore {
        &self.shared
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn policy(&self) -> &UnlockEscalationPolicy {
        &self.policy
    }

    pub fn relock_timer(&self) -> &RelockTimer {
        &self.relock
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Targets exempt at `now`, whether or not they are still selected.
    pub fn active_exemptions(&self, now: DateTime<Utc>) -> Result<BTreeSet<RestrictionTarget>> {
        Ok(self.sessions.active_targets(now)?)
    }

    /// What the next unlock of `target` costs at `now`.
    pub fn requirement(
        &self,
        target: &RestrictionTarget,
        now: DateTime<Utc>,
    ) -> Result<UnlockRequirement> {
        Ok(self.policy.requirement(&self.sessions, target, now)?)
    }

    pub fn required_duration(&self, target: &RestrictionTarget, now: DateTime<Utc>) -> Result<u64> {
        Ok(self.requirement(target, now)?.required_secs)
    }

    /// Access left on `target`'s exemption, for the UI countdown only.
    pub fn exemption_remaining(
        &self,
        target: &RestrictionTarget,
        now: DateTime<Utc>,
    ) -> Result<Option<Duration>> {
        Ok(self
            .sessions
            .active_sessions(now)?
            .iter()
            .filter(|s| &s.target == target)
            .map(|s| s.remaining(now))
            .max())
    }

    /// Derive the full enforcement picture without actuating anything.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Result<EnforcementSnapshot> {
        let selection = self.shared.load_selection()?;
        let active = self.sessions.active_sessions(now)?;
        let exempt_targets: BTreeSet<_> = active.iter().map(|s| s.target.clone()).collect();
        let actuation = Actuation::for_restricted(selection.without(&exempt_targets));
        let exempt = active
            .iter()
            .map(|s| ExemptionStatus {
                target: s.target.clone(),
                expires_at: s.expires_at,
                remaining_secs: s.remaining(now).num_seconds(),
            })
            .collect();
        Ok(EnforcementSnapshot {
            selection,
            exempt,
            actuation,
            pending_request: self.shared.peek_pending_request()?,
            at: now,
        })
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Actuate `selection - active exemptions` in a single call.
    ///
    /// Makes no call when the result matches the last accepted actuation, or
    /// on a process's first call, the rule the surface reports in place. A
    /// rejected actuation is logged and reported, not returned as an error:
    /// the next invocation from any trigger recomputes and tries again.
    pub fn apply_enforcement(&mut self, now: DateTime<Utc>) -> Result<Event> {
        let selection = self.shared.load_selection()?;
        let active = self.sessions.active_sessions(now)?;
        let exempt: BTreeSet<RestrictionTarget> =
            active.iter().map(|s| s.target.clone()).collect();

        self.relock.sync(
            active
                .iter()
                .filter(|s| selection.contains(&s.target))
                .map(|s| (s.target.clone(), s.expires_at)),
        );

        let exempt_selected: Vec<RestrictionTarget> = exempt
            .iter()
            .filter(|t| selection.contains(t))
            .cloned()
            .collect();
        let actuation = Actuation::for_restricted(selection.without(&exempt));

        if self.last_actuation.is_none() {
            self.last_actuation = match self.surface.current() {
                Ok(current) => current,
                Err(e) => {
                    tracing::warn!(error = %e, "could not read the rule in place, actuating anyway");
                    None
                }
            };
        }
        if self.last_actuation.as_ref() == Some(&actuation) {
            tracing::debug!("restriction set unchanged, skipping actuation");
            return Ok(Event::EnforcementUnchanged { at: now });
        }

        if let Err(e) = self.surface.actuate(&actuation) {
            tracing::warn!(error = %e, "actuation failed, leaving retry to the next trigger");
            return Ok(Event::ActuationFailed {
                reason: e.to_string(),
                at: now,
            });
        }

        let event = match actuation.restricted() {
            Some(restricted) => {
                tracing::info!(
                    restricted = restricted.len(),
                    exempt = exempt_selected.len(),
                    "applied restrictions"
                );
                Event::EnforcementApplied {
                    restricted_count: restricted.len(),
                    exempt: exempt_selected,
                    at: now,
                }
            }
            None => {
                tracing::info!(exempt = exempt_selected.len(), "cleared restrictions");
                Event::EnforcementCleared {
                    exempt: exempt_selected,
                    at: now,
                }
            }
        };
        self.last_actuation = Some(actuation);
        Ok(event)
    }

    /// Grant an exemption for `target` if `completed_secs` meets the current
    /// tier, then re-apply enforcement.
    ///
    /// Retrying with the same `now` is a no-op grant: the recorded session is
    /// reported again instead of being charged at the next tier.
    ///
    /// # Errors
    /// [`CoreError::Policy`](crate::error::CoreError::Policy) when the
    /// reported time is short. Nothing is recorded or actuated in that case.
    pub fn grant_exemption(
        &mut self,
        target: &RestrictionTarget,
        completed_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        // Stored grant times have millisecond precision.
        let granted_at = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        let history = self
            .sessions
            .recent_sessions(target, self.policy.window_start(granted_at))?;

        let (session, requirement) =
            match history.iter().find(|s| s.granted_at == granted_at) {
                Some(existing) => {
                    tracing::debug!(token = %target, "grant already recorded");
                    let earlier: Vec<_> = history
                        .iter()
                        .filter(|s| s.granted_at < granted_at)
                        .cloned()
                        .collect();
                    let requirement =
                        self.policy.requirement_from_history(target, &earlier, granted_at);
                    (existing.clone(), requirement)
                }
                None => {
                    let requirement =
                        self.policy.requirement_from_history(target, &history, granted_at);
                    if completed_secs < requirement.required_secs {
                        tracing::info!(
                            token = %target,
                            completed_secs,
                            required_secs = requirement.required_secs,
                            "exemption denied"
                        );
                        return Err(PolicyViolation {
                            required_secs: requirement.required_secs,
                            completed_secs,
                            tier: requirement.tier.as_u8(),
                        }
                        .into());
                    }
                    let session = UnlockSession::new(
                        target.clone(),
                        granted_at,
                        self.access_window,
                        completed_secs,
                    );
                    self.sessions.record(&session)?;
                    tracing::info!(
                        token = %target,
                        tier = requirement.tier.as_u8(),
                        expires_at = %session.expires_at,
                        "exemption granted"
                    );
                    (session, requirement)
                }
            };

        self.relock.arm(target.clone(), session.expires_at);
        let watch = UsageThresholdWatch {
            target: target.clone(),
            threshold_secs: self.access_window.num_seconds().max(0) as u64,
            registered_at: granted_at,
        };
        if let Err(e) = self.scheduler.register_usage_threshold(&watch) {
            tracing::warn!(token = %target, error = %e, "could not register relock backstop");
        }

        let granted = Event::ExemptionGranted {
            target: target.clone(),
            tier: requirement.tier.as_u8(),
            required_secs: requirement.required_secs,
            completed_secs: session.completed_secs,
            granted_at: session.granted_at,
            expires_at: session.expires_at,
        };
        let applied = self.apply_enforcement(now)?;
        Ok(vec![granted, applied])
    }

    /// Revoke every active exemption now, regardless of remaining time.
    pub fn force_relock_all(&mut self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let revoked = self.sessions.revoke_all(now)?;
        let disarmed = self.relock.disarm_all();
        let targets: BTreeSet<RestrictionTarget> =
            revoked.into_iter().map(|s| s.target).collect();
        for target in &targets {
            if let Err(e) = self.scheduler.cancel_usage_threshold(target) {
                tracing::warn!(token = %target, error = %e, "could not cancel relock backstop");
            }
        }
        tracing::info!(revoked = targets.len(), disarmed, "relocked all targets");

        let relocked = Event::AllRelocked {
            revoked: targets.into_iter().collect(),
            at: now,
        };
        let applied = self.apply_enforcement(now)?;
        Ok(vec![relocked, applied])
    }

    /// Persist a new selection, drop timers for removed targets, re-apply.
    pub fn on_selection_changed(
        &mut self,
        selection: &RestrictionSelection,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let previous = self.shared.load_selection()?;
        self.shared.save_selection(selection)?;

        let dropped = previous.dropped_in(selection);
        for target in &dropped {
            self.relock.disarm(target);
            if let Err(e) = self.scheduler.cancel_usage_threshold(target) {
                tracing::warn!(token = %target, error = %e, "could not cancel relock backstop");
            }
        }

        let changed = Event::SelectionChanged {
            entries: selection.len(),
            dropped: dropped.into_iter().collect(),
            at: now,
        };
        let applied = self.apply_enforcement(now)?;
        Ok(vec![changed, applied])
    }

    /// Delete history that can no longer affect any requirement.
    pub fn prune_history(&self, margin: Duration, now: DateTime<Utc>) -> Result<Event> {
        let before = self.policy.prune_cutoff(now, margin);
        let deleted = self.sessions.prune(before)?;
        tracing::debug!(deleted, before = %before, "pruned unlock history");
        Ok(Event::SessionsPruned {
            deleted,
            before,
            at: now,
        })
    }

    /// Fire due relock timers. Returns the enforcement event if any fired.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Option<Event>> {
        let fired = self.relock.due(now);
        if fired.is_empty() {
            return Ok(None);
        }
        tracing::info!(count = fired.len(), "relock timer fired");
        self.apply_enforcement(now).map(Some)
    }
}
