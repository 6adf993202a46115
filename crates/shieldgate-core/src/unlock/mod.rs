mod escalation;
mod session;

pub use escalation::{EscalationTier, UnlockEscalationPolicy, UnlockRequirement};
pub use session::UnlockSession;
