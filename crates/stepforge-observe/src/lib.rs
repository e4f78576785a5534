//! Observability setup for Stepforge binaries.

pub mod tracing_setup;
