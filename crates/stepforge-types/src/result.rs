//! Step results.
//!
//! A `StepResult` is created once per step attempt and appended to the
//! run's log. Its `outcome` is either a value or an error, never both and
//! never neither.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, StepError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Structured error detail carried on failed results and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepErrorInfo {
    pub message: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Cause chain, outermost first.
    #[serde(default)]
    pub trace: Vec<String>,
    pub step_id: String,
    pub timestamp: DateTime<Utc>,
}

impl StepErrorInfo {
    pub fn from_error(step_id: &str, error: &StepError) -> Self {
        Self {
            message: error.to_string(),
            kind: error.kind(),
            code: error.code().map(str::to_string),
            trace: error.trace(),
            step_id: step_id.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Exactly one of a result value or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Result(Value),
    Error(StepErrorInfo),
}

/// The record of one step attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    /// 1-based attempt number.
    pub attempt: u32,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl StepResult {
    pub fn completed(step_id: &str, value: Value, execution_time_ms: u64, attempt: u32) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Completed,
            outcome: StepOutcome::Result(value),
            execution_time_ms,
            timestamp: Utc::now(),
            attempt,
            metadata: HashMap::new(),
        }
    }

    pub fn failed(step_id: &str, error: &StepError, execution_time_ms: u64, attempt: u32) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Failed,
            outcome: StepOutcome::Error(StepErrorInfo::from_error(step_id, error)),
            execution_time_ms,
            timestamp: Utc::now(),
            attempt,
            metadata: HashMap::new(),
        }
    }

    pub fn cancelled(step_id: &str, execution_time_ms: u64, attempt: u32) -> Self {
        let error = StepError::Cancelled {
            step_id: step_id.to_string(),
        };
        Self {
            status: StepStatus::Cancelled,
            ..Self::failed(step_id, &error, execution_time_ms, attempt)
        }
    }

    /// A completed result that records a swallowed failure as a warning.
    pub fn skipped(step_id: &str, warning: &str, execution_time_ms: u64, attempt: u32) -> Self {
        let mut result = Self::completed(
            step_id,
            serde_json::json!({ "skipped": true }),
            execution_time_ms,
            attempt,
        );
        result
            .metadata
            .insert("warning".to_string(), Value::String(warning.to_string()));
        result
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            StepOutcome::Result(v) => Some(v),
            StepOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&StepErrorInfo> {
        match &self.outcome {
            StepOutcome::Error(e) => Some(e),
            StepOutcome::Result(_) => None,
        }
    }

    pub fn warning(&self) -> Option<&str> {
        self.metadata.get("warning").and_then(Value::as_str)
    }
}
