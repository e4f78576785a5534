//! Workflow definitions: an ordered list of steps plus initial variables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::step::Step;

/// A named, ordered sequence of steps executed by one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Initial run variables; overridden by caller-supplied values.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    /// Whether failed steps are handed to recovery. `None` defers to the
    /// engine configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_enabled: Option<bool>,
    pub steps: Vec<Step>,
}

/// Terminal status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Paused,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Paused => write!(f, "paused"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}
