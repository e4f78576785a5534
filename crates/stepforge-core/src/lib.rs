//! Step execution engine for Stepforge.
//!
//! This crate holds the engine logic and the "ports" (page capability,
//! selector-confidence store, timing history, network telemetry) that the
//! infrastructure layer implements. It depends only on `stepforge-types`,
//! never on `stepforge-infra`.

pub mod context;
pub mod definition;
pub mod event;
pub mod executor;
pub mod expression;
pub mod handlers;
pub mod page;
pub mod recovery;
pub mod repository;
pub mod resolver;
pub mod runner;
pub mod timing;

#[cfg(test)]
pub(crate) mod testutil;
