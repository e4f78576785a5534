//! Sequential workflow runs on top of a shared `StepExecutor`.
//!
//! A run walks the workflow's steps in order, stopping at the first step
//! that fails, asks to pause, or is cancelled. Paused runs continue with
//! [`WorkflowRunner::resume`] from the interrupted step, which re-enters
//! `PENDING` with a fresh attempt budget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use stepforge_types::event::StepEvent;
use stepforge_types::result::StepResult;
use stepforge_types::step::StepType;
use stepforge_types::workflow::{RunStatus, Workflow};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::{ExecutionContext, LogLevel, RunMetrics};
use crate::definition::{WorkflowError, required_step_types, validate_definition};
use crate::executor::{ExecutorError, FailureReport, StepExecutor};
use crate::page::BoxPage;

// ---------------------------------------------------------------------------
// Report and errors
// ---------------------------------------------------------------------------

/// Outcome of one `run` or `resume` call.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub workflow_name: String,
    pub status: RunStatus,
    /// Every attempt result recorded in the context so far, resumed
    /// segments included.
    pub results: Vec<StepResult>,
    /// Index of the step to resume from when `status` is `Paused`.
    pub paused_at: Option<usize>,
    /// The step that ended the run, for failed, paused and cancelled runs.
    pub stopped_at: Option<String>,
    pub error: Option<String>,
    pub failure: Option<FailureReport>,
    pub metrics: RunMetrics,
    pub duration_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Definition(#[from] WorkflowError),

    #[error("no handler registered for step types: {}", format_types(.0))]
    MissingHandlers(Vec<StepType>),

    #[error("resume index {index} is out of range for {total} steps")]
    InvalidResumeIndex { index: usize, total: usize },

    #[error("run {0} is already in progress")]
    AlreadyRunning(Uuid),

    #[error("workflow run not found: {0}")]
    RunNotFound(Uuid),
}

fn format_types(types: &[StepType]) -> String {
    types
        .iter()
        .map(StepType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Deregisters the run token on every exit path.
struct RunGuard<'a> {
    runs: &'a DashMap<Uuid, CancellationToken>,
    run_id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.runs.remove(&self.run_id);
    }
}

// ---------------------------------------------------------------------------
// WorkflowRunner
// ---------------------------------------------------------------------------

pub struct WorkflowRunner {
    executor: Arc<StepExecutor>,
    runs: DashMap<Uuid, CancellationToken>,
}

impl WorkflowRunner {
    pub fn new(executor: Arc<StepExecutor>) -> Self {
        Self {
            executor,
            runs: DashMap::new(),
        }
    }

    pub fn executor(&self) -> &Arc<StepExecutor> {
        &self.executor
    }

    /// Build the context for a new run: workflow variables first, then
    /// `overrides` on top.
    pub fn prepare_context(
        &self,
        workflow: &Workflow,
        page: Option<BoxPage>,
        overrides: HashMap<String, Value>,
    ) -> ExecutionContext {
        let retry_enabled = workflow
            .retry_enabled
            .unwrap_or(self.executor.config().retry_enabled);
        let mut ctx = ExecutionContext::new(workflow.name.clone())
            .with_variables(workflow.variables.clone())
            .with_variables(overrides)
            .with_retry_enabled(retry_enabled);
        if let Some(page) = page {
            ctx = ctx.with_page(page);
        }
        ctx.set_progress(0, workflow.steps.len());
        ctx
    }

    pub async fn run(
        &self,
        workflow: &Workflow,
        ctx: &mut ExecutionContext,
    ) -> Result<RunReport, RunError> {
        self.run_from(workflow, ctx, 0).await
    }

    /// Continue a paused run at `from_index`.
    pub async fn resume(
        &self,
        workflow: &Workflow,
        ctx: &mut ExecutionContext,
        from_index: usize,
    ) -> Result<RunReport, RunError> {
        if from_index >= workflow.steps.len() {
            return Err(RunError::InvalidResumeIndex {
                index: from_index,
                total: workflow.steps.len(),
            });
        }
        tracing::info!(run_id = %ctx.run_id, from_index, "resuming workflow run");
        self.run_from(workflow, ctx, from_index).await
    }

    /// Cancel an in-progress run. The executing step observes the
    /// cancellation through its child token.
    pub fn cancel_run(&self, run_id: Uuid) -> Result<(), RunError> {
        let token = self
            .runs
            .get(&run_id)
            .map(|entry| entry.value().clone())
            .ok_or(RunError::RunNotFound(run_id))?;
        token.cancel();
        tracing::info!(run_id = %run_id, "workflow run cancelled");
        Ok(())
    }

    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    async fn run_from(
        &self,
        workflow: &Workflow,
        ctx: &mut ExecutionContext,
        start: usize,
    ) -> Result<RunReport, RunError> {
        validate_definition(workflow)?;
        self.executor
            .ensure_handlers(&required_step_types(workflow))
            .map_err(RunError::MissingHandlers)?;

        let run_id = ctx.run_id;
        if self.runs.contains_key(&run_id) {
            return Err(RunError::AlreadyRunning(run_id));
        }
        self.runs.insert(run_id, ctx.cancellation().clone());
        let _guard = RunGuard {
            runs: &self.runs,
            run_id,
        };

        let total = workflow.steps.len();
        let events = self.executor.events();
        let started = Instant::now();
        if start == 0 {
            events.publish(StepEvent::RunStarted {
                run_id,
                workflow_name: workflow.name.clone(),
                total_steps: total,
            });
        }
        tracing::info!(
            run_id = %run_id,
            workflow = workflow.name.as_str(),
            total,
            start,
            "starting workflow run"
        );

        let mut report = RunReport {
            run_id,
            workflow_name: workflow.name.clone(),
            status: RunStatus::Completed,
            results: Vec::new(),
            paused_at: None,
            stopped_at: None,
            error: None,
            failure: None,
            metrics: RunMetrics::default(),
            duration_ms: 0,
        };

        for (index, step) in workflow.steps.iter().enumerate().skip(start) {
            if ctx.cancellation().is_cancelled() {
                report.status = RunStatus::Cancelled;
                report.stopped_at = Some(step.id.clone());
                break;
            }
            ctx.set_progress(index, total);

            let err = match self.executor.execute_step(step, ctx).await {
                Ok(_) => continue,
                Err(err) => err,
            };
            report.stopped_at = Some(step.id.clone());
            report.error = Some(err.to_string());

            match err {
                ExecutorError::Cancelled { .. } => {
                    report.status = RunStatus::Cancelled;
                }
                ExecutorError::PauseRequested(failure) => {
                    report.status = RunStatus::Paused;
                    report.paused_at = Some(index);
                    report.failure = Some(*failure);
                    events.publish(StepEvent::RunPaused {
                        run_id,
                        step_id: step.id.clone(),
                        step_index: index,
                    });
                    tracing::info!(run_id = %run_id, step_id = step.id.as_str(), index, "workflow run paused");
                }
                other => {
                    report.status = RunStatus::Failed;
                    report.failure = other.report().cloned();
                    events.publish(StepEvent::RunFailed {
                        run_id,
                        step_id: step.id.clone(),
                        error: other.to_string(),
                    });
                    tracing::warn!(run_id = %run_id, step_id = step.id.as_str(), error = %other, "workflow run failed");
                }
            }
            break;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        if report.status == RunStatus::Completed {
            ctx.set_progress(total, total);
            events.publish(StepEvent::RunCompleted {
                run_id,
                duration_ms: report.duration_ms,
            });
            tracing::info!(run_id = %run_id, duration_ms = report.duration_ms, "workflow run completed");
        }
        ctx.log(
            LogLevel::Info,
            None,
            format!("run {} ended {}", run_id, report.status),
        );
        report.results = ctx.results().to_vec();
        report.metrics = ctx.metrics().clone();
        Ok(report)
    }
}

impl std::fmt::Debug for WorkflowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRunner")
            .field("executor", &self.executor)
            .field("active_runs", &self.runs.len())
            .finish()
    }
}
