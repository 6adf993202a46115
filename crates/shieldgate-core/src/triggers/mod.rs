//! Entry points for the contexts the host invokes.
//!
//! Each host context is short-lived and shares nothing with the others but
//! the stores, so every adapter starts from durable state:
//!
//! - [`interval`]: daily interval start and end
//! - [`threshold`]: a usage-threshold watch was reached
//! - [`button`]: the overlay's unlock button was pressed
//! - [`interactive`]: the interactive context came to the foreground

pub mod button;
pub mod interactive;
pub mod interval;
pub mod threshold;

pub use interval::IntervalTrigger;
