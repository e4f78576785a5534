//! Infrastructure layer for Stepforge.
//!
//! Implements the ports defined in `stepforge-core`: the selector
//! confidence store, the timing history table, network telemetry and a
//! page capability backed by a recorded DOM snapshot. Also owns the
//! `config.toml` loader and data directory resolution.

pub mod config;
pub mod error;
pub mod json_file;
pub mod selector_store;
pub mod snapshot_page;
pub mod telemetry;
pub mod timing_history;

pub use error::InfraError;
