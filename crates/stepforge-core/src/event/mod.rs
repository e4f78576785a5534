//! Lifecycle event distribution.
//!
//! The executor and runner publish `StepEvent`s on an `EventBus`; any number
//! of observers subscribe without the execution path knowing about them.

pub mod bus;

pub use bus::{EventBus, EventLog};
