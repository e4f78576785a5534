//! Repository trait definitions (ports).
//!
//! These traits define the shared-state interfaces that the infrastructure
//! layer (stepforge-infra) implements. The core crate never depends on any
//! specific storage technology.
//!
//! Unlike the page capability, these ports are synchronous: every
//! implementation is an in-process map or a snapshot of one, and
//! concurrent runs call them from inside hot resolution loops.

pub mod selector;
pub mod timing;
