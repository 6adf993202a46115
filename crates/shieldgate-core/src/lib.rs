//! # Shieldgate Core Library
//!
//! This library decides which apps and web domains a host should shield,
//! and lets the user buy temporary access to one of them by completing an
//! attention task whose length grows with how often they have unlocked it
//! recently.
//!
//! The host invokes the engine from several unrelated, short-lived
//! contexts. None of them shares memory with another, so every decision is
//! recomputed from durable state and an explicit `now`.
//!
//! ## Architecture
//!
//! - **Selection**: the four target sets the user picked, stored as one
//!   versioned blob
//! - **Storage**: SQLite stores shared across processes, plus TOML
//!   configuration
//! - **Unlock**: immutable unlock sessions and the escalation policy that
//!   prices the next one
//! - **Enforcement**: the controller that actuates `selection - exemptions`
//! - **Triggers**: entry points for each host context
//!
//! ## Key Components
//!
//! - [`EnforcementController`]: applies, grants, relocks
//! - [`SharedStore`]: selection and pending-request slot
//! - [`SessionStore`]: unlock history
//! - [`UnlockEscalationPolicy`]: tier table over a lookback window
//! - [`Config`]: engine configuration

pub mod enforcement;
pub mod error;
pub mod events;
pub mod host;
pub mod selection;
pub mod storage;
pub mod target;
pub mod triggers;
pub mod unlock;

pub use enforcement::{EnforcementController, EnforcementSnapshot, ExemptionStatus, RelockTimer};
pub use error::{ActuationError, ConfigError, CoreError, PolicyViolation, StoreError};
pub use events::Event;
pub use host::{Actuation, DailyInterval, ForegroundLauncher, HostScheduler, RestrictionSurface};
pub use selection::RestrictionSelection;
pub use storage::{Config, DecodeFailurePolicy, PendingRequest, SessionStore, SharedStore};
pub use target::{RestrictionTarget, TargetKind};
pub use triggers::IntervalTrigger;
pub use unlock::{EscalationTier, UnlockEscalationPolicy, UnlockRequirement, UnlockSession};
