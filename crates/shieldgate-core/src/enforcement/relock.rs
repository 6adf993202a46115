//! In-process relock timer.
//!
//! Like the rest of the engine this has no thread of its own: the host calls
//! [`RelockTimer::due`] (through the controller's `tick`) whenever it gets a
//! chance. Losing this timer never extends an exemption, since the stored
//! expiry is checked on every enforcement pass anyway.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::target::RestrictionTarget;

#[derive(Debug, Clone, Default)]
pub struct RelockTimer {
    deadlines: BTreeMap<RestrictionTarget, DateTime<Utc>>,
}

impl RelockTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for `target`.
    pub fn arm(&mut self, target: RestrictionTarget, deadline: DateTime<Utc>) {
        self.deadlines.insert(target, deadline);
    }

    pub fn disarm(&mut self, target: &RestrictionTarget) -> bool {
        self.deadlines.remove(target).is_some()
    }

    pub fn disarm_all(&mut self) -> usize {
        let n = self.deadlines.len();
        self.deadlines.clear();
        n
    }

    /// Replace all armed deadlines with `armed`.
    pub fn sync(&mut self, armed: impl IntoIterator<Item = (RestrictionTarget, DateTime<Utc>)>) {
        self.deadlines.clear();
        for (target, deadline) in armed {
            // Keep the later deadline when a target has overlapping sessions.
            let entry = self.deadlines.entry(target).or_insert(deadline);
            if deadline > *entry {
                *entry = deadline;
            }
        }
    }

    /// Remove and return every target whose deadline is at or before `now`.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<RestrictionTarget> {
        let fired: Vec<_> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(target, _)| target.clone())
            .collect();
        for target in &fired {
            self.deadlines.remove(target);
        }
        fired
    }

    pub fn deadline(&self, target: &RestrictionTarget) -> Option<DateTime<Utc>> {
        self.deadlines.get(target).copied()
    }

    /// Earliest pending deadline, for hosts that sleep until the next relock.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.deadlines.values().min().copied()
    }

    pub fn is_armed(&self, target: &RestrictionTarget) -> bool {
        self.deadlines.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
