mod controller;
mod relock;

pub use controller::{EnforcementController, EnforcementSnapshot, ExemptionStatus};
pub use relock::RelockTimer;
