//! Shared domain types for Stepforge.
//!
//! Steps, selectors, results, recovery and timing descriptors, lifecycle
//! events, engine configuration, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod element;
pub mod error;
pub mod event;
pub mod recovery;
pub mod result;
pub mod selector;
pub mod step;
pub mod timing;
pub mod workflow;
