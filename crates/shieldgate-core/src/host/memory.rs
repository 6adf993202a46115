//! In-process host surfaces that record every call.
//!
//! Useful for embedding the engine in a host that polls state, and for tests
//! that assert on exactly which actuation calls were made.

use std::cell::RefCell;
use std::rc::Rc;

use super::{
    Actuation, DailyInterval, ForegroundLauncher, HostScheduler, RestrictionSurface,
    UsageThresholdWatch,
};
use crate::error::ActuationError;
use crate::selection::RestrictionSelection;
use crate::storage::PendingRequest;
use crate::target::RestrictionTarget;

/// Records actuations. Clones share the same log, so a test can keep one
/// handle while the controller owns another.
#[derive(Debug, Clone, Default)]
pub struct MemorySurface {
    inner: Rc<RefCell<SurfaceLog>>,
}

#[derive(Debug, Default)]
struct SurfaceLog {
    calls: Vec<Actuation>,
    fail_next: Option<String>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every successful actuation, oldest first.
    pub fn calls(&self) -> Vec<Actuation> {
        self.inner.borrow().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.borrow().calls.len()
    }

    pub fn last(&self) -> Option<Actuation> {
        self.inner.borrow().calls.last().cloned()
    }

    /// Make the next actuation fail with `message`.
    pub fn fail_next(&self, message: &str) {
        self.inner.borrow_mut().fail_next = Some(message.to_string());
    }

    fn push(&mut self, actuation: Actuation) -> Result<(), ActuationError> {
        let mut log = self.inner.borrow_mut();
        if let Some(message) = log.fail_next.take() {
            return Err(ActuationError::Rejected {
                surface: "memory surface",
                message,
            });
        }
        log.calls.push(actuation);
        Ok(())
    }
}

impl RestrictionSurface for MemorySurface {
    fn set_restricted(&mut self, restricted: &RestrictionSelection) -> Result<(), ActuationError> {
        self.push(Actuation::Restrict {
            restricted: restricted.clone(),
        })
    }

    fn clear_restricted(&mut self) -> Result<(), ActuationError> {
        self.push(Actuation::Clear)
    }

    fn current(&self) -> Result<Option<Actuation>, ActuationError> {
        Ok(self.last())
    }
}

/// Records scheduler registrations.
#[derive(Debug, Clone, Default)]
pub struct MemoryScheduler {
    inner: Rc<RefCell<SchedulerLog>>,
}

#[derive(Debug, Default)]
struct SchedulerLog {
    interval: Option<DailyInterval>,
    watches: Vec<UsageThresholdWatch>,
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interval(&self) -> Option<DailyInterval> {
        self.inner.borrow().interval.clone()
    }

    /// Currently registered watches.
    pub fn watches(&self) -> Vec<UsageThresholdWatch> {
        self.inner.borrow().watches.clone()
    }
}

impl HostScheduler for MemoryScheduler {
    fn register_daily_interval(&mut self, interval: &DailyInterval) -> Result<(), ActuationError> {
        self.inner.borrow_mut().interval = Some(interval.clone());
        Ok(())
    }

    fn register_usage_threshold(&mut self, watch: &UsageThresholdWatch) -> Result<(), ActuationError> {
        let mut log = self.inner.borrow_mut();
        log.watches.retain(|w| w.target != watch.target);
        log.watches.push(watch.clone());
        Ok(())
    }

    fn cancel_usage_threshold(&mut self, target: &RestrictionTarget) -> Result<(), ActuationError> {
        self.inner.borrow_mut().watches.retain(|w| &w.target != target);
        Ok(())
    }
}

/// Records foreground requests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLauncher {
    requests: Rc<RefCell<Vec<PendingRequest>>>,
}

impl MemoryLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<PendingRequest> {
        self.requests.borrow().clone()
    }
}

impl ForegroundLauncher for MemoryLauncher {
    fn request_foreground(&mut self, request: &PendingRequest) -> Result<(), ActuationError> {
        self.requests.borrow_mut().push(request.clone());
        Ok(())
    }
}
