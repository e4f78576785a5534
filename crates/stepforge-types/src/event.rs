//! Lifecycle events emitted by the executor and the workflow runner.
//!
//! Events are broadcast to every subscriber. Step events carry the step,
//! its result or error, and a snapshot of the run's context at emission
//! time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::result::{StepErrorInfo, StepResult};
use crate::step::Step;

/// Read-only view of an `ExecutionContext` at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub run_id: Uuid,
    pub workflow_name: String,
    pub current_step: usize,
    pub total_steps: usize,
    pub variables: HashMap<String, Value>,
}

/// Events emitted during step and run execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    StepStarted {
        run_id: Uuid,
        step_id: String,
        step: Step,
        attempt: u32,
        context: ContextSnapshot,
        timestamp: DateTime<Utc>,
    },

    StepCompleted {
        run_id: Uuid,
        step_id: String,
        step: Step,
        result: StepResult,
        context: ContextSnapshot,
        timestamp: DateTime<Utc>,
    },

    StepFailed {
        run_id: Uuid,
        step_id: String,
        step: Step,
        result: StepResult,
        will_retry: bool,
        context: ContextSnapshot,
        timestamp: DateTime<Utc>,
    },

    StepCancelled {
        run_id: Uuid,
        step_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A failure outside the handler: structural or precondition.
    StepError {
        run_id: Uuid,
        step_id: String,
        step: Step,
        error: StepErrorInfo,
        context: ContextSnapshot,
        timestamp: DateTime<Utc>,
    },

    RunStarted {
        run_id: Uuid,
        workflow_name: String,
        total_steps: usize,
    },

    RunCompleted {
        run_id: Uuid,
        duration_ms: u64,
    },

    RunFailed {
        run_id: Uuid,
        step_id: String,
        error: String,
    },

    RunPaused {
        run_id: Uuid,
        step_id: String,
        step_index: usize,
    },
}

impl StepEvent {
    /// Step id for step-level events.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            StepEvent::StepStarted { step_id, .. }
            | StepEvent::StepCompleted { step_id, .. }
            | StepEvent::StepFailed { step_id, .. }
            | StepEvent::StepCancelled { step_id, .. }
            | StepEvent::StepError { step_id, .. }
            | StepEvent::RunFailed { step_id, .. }
            | StepEvent::RunPaused { step_id, .. } => Some(step_id),
            StepEvent::RunStarted { .. } | StepEvent::RunCompleted { .. } => None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            StepEvent::StepStarted { run_id, .. }
            | StepEvent::StepCompleted { run_id, .. }
            | StepEvent::StepFailed { run_id, .. }
            | StepEvent::StepCancelled { run_id, .. }
            | StepEvent::StepError { run_id, .. }
            | StepEvent::RunStarted { run_id, .. }
            | StepEvent::RunCompleted { run_id, .. }
            | StepEvent::RunFailed { run_id, .. }
            | StepEvent::RunPaused { run_id, .. } => *run_id,
        }
    }

    /// Short snake_case name of the variant, matching the serialized tag.
    pub fn name(&self) -> &'static str {
        match self {
            StepEvent::StepStarted { .. } => "step_started",
            StepEvent::StepCompleted { .. } => "step_completed",
            StepEvent::StepFailed { .. } => "step_failed",
            StepEvent::StepCancelled { .. } => "step_cancelled",
            StepEvent::StepError { .. } => "step_error",
            StepEvent::RunStarted { .. } => "run_started",
            StepEvent::RunCompleted { .. } => "run_completed",
            StepEvent::RunFailed { .. } => "run_failed",
            StepEvent::RunPaused { .. } => "run_paused",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_tag_matches_name() {
        let event = StepEvent::StepCancelled {
            run_id: Uuid::now_v7(),
            step_id: "s1".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.name());
        assert_eq!(event.step_id(), Some("s1"));
    }

    #[test]
    fn run_events_have_no_step_id() {
        let event = StepEvent::RunCompleted {
            run_id: Uuid::now_v7(),
            duration_ms: 12,
        };
        assert!(event.step_id().is_none());
        assert_eq!(event.name(), "run_completed");
    }
}
