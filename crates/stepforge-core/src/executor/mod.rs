//! Step execution.
//!
//! `StepExecutor::execute_step` runs one step to a terminal outcome:
//!
//! 1. structural validation (never dispatched, never retried)
//! 2. precondition evaluation
//! 3. handler dispatch raced against the step timeout
//! 4. on failure, a policy decision and possibly bounded recovery with
//!    re-dispatch
//!
//! Every attempt produces exactly one `StepResult` and a lifecycle event on
//! the executor's `EventBus`. The executor is shared between concurrent
//! runs; each run brings its own `ExecutionContext`.

pub mod condition;
pub mod handler;
pub mod retry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use stepforge_types::config::{EngineConfig, ExecutorConfig};
use stepforge_types::error::StepError;
use stepforge_types::event::StepEvent;
use stepforge_types::recovery::{
    AttemptState, ErrorClassification, Recommendation, RecoveryStrategyKind,
};
use stepforge_types::result::{StepErrorInfo, StepResult};
use stepforge_types::step::{ErrorAction, Step, StepType};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::{ExecutionContext, LogLevel};
use crate::event::EventBus;
use crate::recovery::{ErrorRecoveryFramework, RecoveryContext};
use crate::repository::timing::{NoHistory, TimingHistory};
use crate::resolver::ElementResolver;

pub use self::handler::{BoxStepHandler, HandlerRegistry, StepHandler};
use self::retry::{FailurePolicy, RetryHandler};

// ---------------------------------------------------------------------------
// Errors and reports
// ---------------------------------------------------------------------------

/// Everything the orchestrator needs to act on a step that did not complete.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub step_id: String,
    /// Result of the final attempt.
    pub result: StepResult,
    pub error: StepErrorInfo,
    /// Handler invocations made.
    pub attempts: u32,
    /// Recovery routine invocations made across all attempts.
    pub recovery_attempts: u32,
    pub strategy: Option<RecoveryStrategyKind>,
    pub classification: Option<ErrorClassification>,
    pub recommendation: Recommendation,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("step '{step_id}' is structurally invalid: {reason}")]
    Structural { step_id: String, reason: String },

    #[error("step '{step_id}' precondition failed: {reason}")]
    Precondition { step_id: String, reason: String },

    #[error("step '{}' failed after {} attempt(s): {}", .0.step_id, .0.attempts, .0.error.message)]
    StepFailed(Box<FailureReport>),

    #[error("step '{}' requested a pause: {}", .0.step_id, .0.error.message)]
    PauseRequested(Box<FailureReport>),

    #[error("step '{step_id}' was cancelled")]
    Cancelled {
        step_id: String,
        result: Box<StepResult>,
    },

    #[error("step '{0}' is not active")]
    StepNotActive(String),
}

impl ExecutorError {
    pub fn step_id(&self) -> &str {
        match self {
            ExecutorError::Structural { step_id, .. }
            | ExecutorError::Precondition { step_id, .. }
            | ExecutorError::Cancelled { step_id, .. }
            | ExecutorError::StepNotActive(step_id) => step_id,
            ExecutorError::StepFailed(report) | ExecutorError::PauseRequested(report) => {
                &report.step_id
            }
        }
    }

    pub fn report(&self) -> Option<&FailureReport> {
        match self {
            ExecutorError::StepFailed(report) | ExecutorError::PauseRequested(report) => {
                Some(report)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Active-step registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ActiveKey {
    run_id: Uuid,
    step_id: String,
}

#[derive(Debug)]
struct ActiveStep {
    token: CancellationToken,
    state: AttemptState,
    attempt: u32,
    started: Instant,
}

/// Removes the registry entry on every exit path.
struct ActiveGuard<'a> {
    active: &'a DashMap<ActiveKey, ActiveStep>,
    key: ActiveKey,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.key);
    }
}

/// Snapshot of executor state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutorStats {
    pub active_steps: usize,
    pub registered_handlers: usize,
    pub handler_types: Vec<StepType>,
}

/// How a failed attempt ends when it is not retried.
enum Terminal {
    Skip,
    Pause,
    Fail,
}

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

pub struct StepExecutor {
    config: ExecutorConfig,
    handlers: HandlerRegistry,
    recovery: ErrorRecoveryFramework,
    history: Arc<dyn TimingHistory>,
    events: EventBus,
    active: DashMap<ActiveKey, ActiveStep>,
}

impl StepExecutor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.executor.clone(),
            handlers: HandlerRegistry::new(),
            recovery: ErrorRecoveryFramework::new(config.recovery.clone()),
            history: Arc::new(NoHistory),
            events: EventBus::new(config.executor.event_capacity),
            active: DashMap::new(),
        }
    }

    /// Let element-not-found recovery re-resolve targets.
    pub fn with_resolver(mut self, resolver: Arc<ElementResolver>) -> Self {
        self.recovery = self.recovery.with_resolver(resolver);
        self
    }

    /// Record each attempt's duration for adaptive timing.
    pub fn with_timing_history(mut self, history: Arc<dyn TimingHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn recovery(&self) -> &ErrorRecoveryFramework {
        &self.recovery
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    // -- handlers -----------------------------------------------------------

    /// Register the handler for `step_type`, replacing any previous one.
    pub fn register_handler<H: StepHandler + 'static>(&mut self, step_type: StepType, handler: H) {
        self.handlers.register(step_type, BoxStepHandler::new(handler));
    }

    pub fn register_boxed_handler(&mut self, step_type: StepType, handler: BoxStepHandler) {
        self.handlers.register(step_type, handler);
    }

    /// Fails with the missing types unless every type in `required` has a
    /// handler.
    pub fn ensure_handlers(&self, required: &[StepType]) -> Result<(), Vec<StepType>> {
        let missing = self.handlers.missing(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            active_steps: self.active.len(),
            registered_handlers: self.handlers.len(),
            handler_types: self.handlers.types(),
        }
    }

    // -- cancellation -------------------------------------------------------

    /// Request cancellation of an executing step.
    ///
    /// Cooperative: the handler keeps running until it next checks its
    /// token or returns, and whatever it returns is discarded.
    pub fn cancel_step(&self, run_id: Uuid, step_id: &str) -> Result<(), ExecutorError> {
        let key = ActiveKey {
            run_id,
            step_id: step_id.to_string(),
        };
        {
            let Some(mut entry) = self.active.get_mut(&key) else {
                return Err(ExecutorError::StepNotActive(step_id.to_string()));
            };
            // Already reported as completed; only `wait_after` remains.
            if entry.state == AttemptState::Completed {
                return Err(ExecutorError::StepNotActive(step_id.to_string()));
            }
            entry.token.cancel();
            if entry.state.can_transition_to(AttemptState::Cancelled) {
                entry.state = AttemptState::Cancelled;
            }
            tracing::info!(
                run_id = %run_id,
                step_id,
                attempt = entry.attempt,
                running_ms = entry.started.elapsed().as_millis() as u64,
                "step cancellation requested"
            );
        }
        self.events.publish(StepEvent::StepCancelled {
            run_id,
            step_id: step_id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    // -- execution ----------------------------------------------------------

    pub async fn execute_step(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult, ExecutorError> {
        let handler = match self.validate(step) {
            Ok(handler) => handler,
            Err(reason) => {
                tracing::warn!(run_id = %ctx.run_id, step_id = step.id.as_str(), %reason, "invalid step");
                self.emit_step_error(step, ctx, &StepError::Structural(reason.clone()));
                ctx.log(LogLevel::Error, Some(&step.id), format!("invalid step: {reason}"));
                return Err(ExecutorError::Structural {
                    step_id: step.id.clone(),
                    reason,
                });
            }
        };

        if let Err(reason) = condition::check_conditions(step, ctx).await {
            return self.precondition_failed(step, ctx, reason);
        }

        let key = ActiveKey {
            run_id: ctx.run_id,
            step_id: step.id.clone(),
        };
        if self.active.contains_key(&key) {
            let reason = "step is already executing in this run".to_string();
            self.emit_step_error(step, ctx, &StepError::Structural(reason.clone()));
            return Err(ExecutorError::Structural {
                step_id: step.id.clone(),
                reason,
            });
        }
        let token = ctx.cancellation().child_token();
        self.active.insert(
            key.clone(),
            ActiveStep {
                token: token.clone(),
                state: AttemptState::Pending,
                attempt: 1,
                started: Instant::now(),
            },
        );
        let _guard = ActiveGuard {
            active: &self.active,
            key: key.clone(),
        };

        self.run_attempts(step, ctx, &handler, &key, &token).await
    }

    async fn run_attempts(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        handler: &BoxStepHandler,
        key: &ActiveKey,
        token: &CancellationToken,
    ) -> Result<StepResult, ExecutorError> {
        let timeout_ms = step.timeout_ms.unwrap_or(self.config.default_timeout_ms);
        let retry_enabled = self.config.retry_enabled && ctx.retry_enabled;
        let max_attempts = self.config.max_step_attempts.max(1);
        let mut attempt = 1u32;
        let mut recovery_attempts = 0u32;

        loop {
            if token.is_cancelled() {
                return Err(self.cancelled(step, ctx, key, 0, attempt));
            }
            self.transition(key, AttemptState::Running, attempt);
            self.events.publish(StepEvent::StepStarted {
                run_id: ctx.run_id,
                step_id: step.id.clone(),
                step: step.clone(),
                attempt,
                context: ctx.snapshot(),
                timestamp: Utc::now(),
            });
            tracing::debug!(run_id = %ctx.run_id, step_id = step.id.as_str(), attempt, timeout_ms, "dispatching step");

            ctx.begin_step(token.clone());
            let started = Instant::now();
            let outcome =
                match tokio::time::timeout(Duration::from_millis(timeout_ms), handler.execute(step, ctx))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(StepError::Timeout {
                        step_id: step.id.clone(),
                        timeout_ms,
                    }),
                };
            let elapsed_ms = started.elapsed().as_millis() as u64;
            ctx.end_step();

            if token.is_cancelled() {
                return Err(self.cancelled(step, ctx, key, elapsed_ms, attempt));
            }

            let error = match outcome {
                Ok(value) => {
                    self.history.record(&step.timing_key(), elapsed_ms, true);
                    self.transition(key, AttemptState::Completed, attempt);
                    let result = StepResult::completed(&step.id, value, elapsed_ms, attempt);
                    tracing::info!(run_id = %ctx.run_id, step_id = step.id.as_str(), attempt, elapsed_ms, "step completed");
                    self.finish_completed(step, ctx, result.clone());
                    self.active.remove(key);
                    if let Some(delay) = step.wait_after_ms.filter(|d| *d > 0) {
                        tokio::select! {
                            _ = token.cancelled() => {}
                            _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                        }
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            self.history.record(&step.timing_key(), elapsed_ms, false);
            self.transition(key, AttemptState::Failed, attempt);
            let failed = StepResult::failed(&step.id, &error, elapsed_ms, attempt);
            tracing::warn!(
                run_id = %ctx.run_id,
                step_id = step.id.as_str(),
                attempt,
                elapsed_ms,
                error = %error,
                "step attempt failed"
            );
            ctx.log(LogLevel::Warn, Some(&step.id), error.to_string());

            let policy = RetryHandler::policy(step, &error, retry_enabled);
            let (terminal, recovery) = match policy {
                FailurePolicy::Skip => (Terminal::Skip, None),
                FailurePolicy::Pause => (Terminal::Pause, None),
                FailurePolicy::Fail => (Terminal::Fail, None),
                FailurePolicy::Recover => {
                    self.transition(key, AttemptState::Recovering, attempt);
                    let outcome = self
                        .recovery
                        .attempt_recovery(
                            &error,
                            &RecoveryContext {
                                step,
                                page: ctx.page(),
                                cancel: token,
                                prior_attempts: recovery_attempts,
                            },
                        )
                        .await;
                    recovery_attempts += outcome.attempts;

                    if outcome.success
                        && RetryHandler::should_retry(attempt, max_attempts)
                        && !token.is_cancelled()
                    {
                        self.emit_failed(step, ctx, &failed, true);
                        ctx.record_result(failed);
                        attempt += 1;
                        tracing::info!(
                            run_id = %ctx.run_id,
                            step_id = step.id.as_str(),
                            attempt,
                            strategy = %outcome.strategy.kind,
                            "retrying step after recovery"
                        );
                        continue;
                    }
                    if token.is_cancelled() {
                        return Err(self.cancelled(step, ctx, key, elapsed_ms, attempt));
                    }

                    let terminal = match outcome.recommendation {
                        Recommendation::Continue => Terminal::Skip,
                        Recommendation::Pause => Terminal::Pause,
                        Recommendation::Retry | Recommendation::AbortExecution => Terminal::Fail,
                    };
                    (terminal, Some(outcome))
                }
            };

            self.emit_failed(step, ctx, &failed, false);

            if let Terminal::Skip = terminal {
                let skipped = StepResult::skipped(&step.id, &error.to_string(), elapsed_ms, attempt)
                    .with_metadata("recovery_attempts", recovery_attempts);
                tracing::info!(run_id = %ctx.run_id, step_id = step.id.as_str(), "step failure skipped");
                self.finish_completed(step, ctx, skipped.clone());
                return Ok(skipped);
            }

            self.transition(key, AttemptState::Failed, attempt);
            let recommendation = match terminal {
                Terminal::Pause => Recommendation::Pause,
                _ => Recommendation::AbortExecution,
            };
            let report = Box::new(FailureReport {
                step_id: step.id.clone(),
                error: StepErrorInfo::from_error(&step.id, &error),
                result: failed.clone(),
                attempts: attempt,
                recovery_attempts,
                strategy: recovery.as_ref().map(|o| o.strategy.kind),
                classification: recovery.as_ref().map(|o| o.classification),
                recommendation,
            });
            ctx.record_result(failed);

            return Err(match terminal {
                Terminal::Pause => ExecutorError::PauseRequested(report),
                _ => ExecutorError::StepFailed(report),
            });
        }
    }

    fn validate(&self, step: &Step) -> Result<BoxStepHandler, String> {
        if step.id.trim().is_empty() {
            return Err("missing step id".into());
        }
        let Some(step_type) = step.step_type else {
            return Err("missing step type".into());
        };
        if step.action.is_none() {
            return Err("missing step action".into());
        }
        if let Some(target) = &step.target {
            if target.primary.trim().is_empty() {
                return Err("target selector has an empty primary".into());
            }
        }
        if step.timeout_ms == Some(0) {
            return Err("timeout must be positive".into());
        }
        self.handlers
            .get(step_type)
            .cloned()
            .ok_or_else(|| format!("no handler registered for step type '{step_type}'"))
    }

    fn precondition_failed(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        reason: String,
    ) -> Result<StepResult, ExecutorError> {
        tracing::info!(run_id = %ctx.run_id, step_id = step.id.as_str(), %reason, "precondition not met");
        self.emit_step_error(step, ctx, &StepError::Precondition(reason.clone()));

        let tolerated = step.continue_on_error
            || matches!(
                step.on_error.map(|o| o.action),
                Some(ErrorAction::Skip | ErrorAction::Continue)
            );
        if !tolerated {
            ctx.log(LogLevel::Warn, Some(&step.id), format!("precondition failed: {reason}"));
            return Err(ExecutorError::Precondition {
                step_id: step.id.clone(),
                reason,
            });
        }

        let skipped = StepResult::skipped(&step.id, &format!("precondition failed: {reason}"), 0, 1)
            .with_metadata("precondition", false);
        self.finish_completed(step, ctx, skipped.clone());
        Ok(skipped)
    }

    fn cancelled(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        key: &ActiveKey,
        elapsed_ms: u64,
        attempt: u32,
    ) -> ExecutorError {
        // Cancellation through `cancel_step` has already been announced.
        let announced = self
            .active
            .get(key)
            .is_some_and(|entry| entry.state == AttemptState::Cancelled);
        if !announced {
            self.transition(key, AttemptState::Cancelled, attempt);
            self.events.publish(StepEvent::StepCancelled {
                run_id: ctx.run_id,
                step_id: step.id.clone(),
                timestamp: Utc::now(),
            });
        }
        tracing::info!(run_id = %ctx.run_id, step_id = step.id.as_str(), attempt, "step cancelled, result discarded");

        let result = StepResult::cancelled(&step.id, elapsed_ms, attempt);
        ctx.record_result(result.clone());
        ExecutorError::Cancelled {
            step_id: step.id.clone(),
            result: Box::new(result),
        }
    }

    fn transition(&self, key: &ActiveKey, next: AttemptState, attempt: u32) {
        if let Some(mut entry) = self.active.get_mut(key) {
            if entry.state == next {
                return;
            }
            if entry.state.can_transition_to(next) {
                entry.state = next;
                entry.attempt = attempt;
            } else {
                tracing::debug!(
                    step_id = key.step_id.as_str(),
                    from = ?entry.state,
                    to = ?next,
                    "ignoring attempt state transition"
                );
            }
        }
    }

    // -- events -------------------------------------------------------------

    fn finish_completed(&self, step: &Step, ctx: &mut ExecutionContext, result: StepResult) {
        ctx.record_result(result.clone());
        self.events.publish(StepEvent::StepCompleted {
            run_id: ctx.run_id,
            step_id: step.id.clone(),
            step: step.clone(),
            result,
            context: ctx.snapshot(),
            timestamp: Utc::now(),
        });
    }

    fn emit_failed(&self, step: &Step, ctx: &ExecutionContext, result: &StepResult, will_retry: bool) {
        self.events.publish(StepEvent::StepFailed {
            run_id: ctx.run_id,
            step_id: step.id.clone(),
            step: step.clone(),
            result: result.clone(),
            will_retry,
            context: ctx.snapshot(),
            timestamp: Utc::now(),
        });
    }

    fn emit_step_error(&self, step: &Step, ctx: &ExecutionContext, error: &StepError) {
        self.events.publish(StepEvent::StepError {
            run_id: ctx.run_id,
            step_id: step.id.clone(),
            step: step.clone(),
            error: StepErrorInfo::from_error(&step.id, error),
            context: ctx.snapshot(),
            timestamp: Utc::now(),
        });
    }
}

impl std::fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepExecutor")
            .field("handlers", &self.handlers.types())
            .field("active_steps", &self.active.len())
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::{Value, json};
    use stepforge_types::config::RecoveryConfig;
    use stepforge_types::error::ErrorKind;
    use stepforge_types::recovery::ErrorCategory;
    use stepforge_types::result::StepStatus;
    use stepforge_types::step::{ActionKind, Condition, ConditionOperator};

    use crate::event::EventLog;

    // -------------------------------------------------------------------
    // Test handlers
    // -------------------------------------------------------------------

    struct Echo;

    impl StepHandler for Echo {
        async fn execute(&self, step: &Step, _ctx: &mut ExecutionContext) -> Result<Value, StepError> {
            Ok(json!({ "echo": step.id }))
        }
    }

    /// Fails with `error` for the first `failures` calls, then succeeds.
    struct Flaky {
        failures: u32,
        calls: Arc<AtomicU32>,
        error: StepError,
    }

    impl StepHandler for Flaky {
        async fn execute(&self, _step: &Step, _ctx: &mut ExecutionContext) -> Result<Value, StepError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(json!("ok"))
            }
        }
    }

    struct Sleepy(u64);

    impl StepHandler for Sleepy {
        async fn execute(&self, _step: &Step, _ctx: &mut ExecutionContext) -> Result<Value, StepError> {
            tokio::time::sleep(Duration::from_millis(self.0)).await;
            Ok(json!("slept"))
        }
    }

    struct Failing(StepError);

    impl StepHandler for Failing {
        async fn execute(&self, _step: &Step, _ctx: &mut ExecutionContext) -> Result<Value, StepError> {
            Err(self.0.clone())
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            recovery: RecoveryConfig {
                base_delay_ms: 1,
                max_delay_ms: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn executor_with<H: StepHandler + 'static>(handler: H) -> StepExecutor {
        let mut executor = StepExecutor::new(&fast_config());
        executor.register_handler(StepType::Interaction, handler);
        executor
    }

    fn click(id: &str) -> Step {
        Step::new(id, StepType::Interaction, ActionKind::Click)
    }

    async fn settle(log: &EventLog, expected: usize) {
        for _ in 0..100 {
            if log.len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    // -------------------------------------------------------------------
    // Validation and preconditions
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn missing_id_or_type_is_structural_and_never_dispatched() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = executor_with(Flaky {
            failures: 0,
            calls: Arc::clone(&calls),
            error: StepError::handler("unused"),
        });
        let log = executor.events().record();
        let mut ctx = ExecutionContext::new("wf");

        let mut no_id = click("x");
        no_id.id = String::new();
        let mut no_type = click("y");
        no_type.step_type = None;

        for step in [no_id, no_type] {
            let err = executor.execute_step(&step, &mut ctx).await.unwrap_err();
            assert!(matches!(err, ExecutorError::Structural { .. }), "{err:?}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        settle(&log, 2).await;
        assert_eq!(log.names(), vec!["step_error", "step_error"]);
    }

    #[tokio::test]
    async fn unregistered_type_is_structural() {
        let executor = executor_with(Echo);
        let mut ctx = ExecutionContext::new("wf");
        let step = Step::new("n", StepType::Navigation, ActionKind::Navigate);
        let err = executor.execute_step(&step, &mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("no handler registered"));
    }

    #[tokio::test]
    async fn failed_precondition_blocks_or_skips() {
        let executor = executor_with(Echo);
        let mut ctx = ExecutionContext::new("wf");
        let guarded = click("guarded").with_condition(Condition::Variable {
            name: "ready".into(),
            operator: ConditionOperator::Equals,
            value: json!(true),
        });

        let err = executor.execute_step(&guarded, &mut ctx).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Precondition { .. }));

        let skippable = guarded.clone().with_on_error(ErrorAction::Skip);
        let result = executor.execute_step(&skippable, &mut ctx).await.unwrap();
        assert_eq!(result.status, StepStatus::Completed);
        assert!(result.warning().unwrap().contains("precondition"));

        ctx.set_variable("ready", json!(true));
        let result = executor.execute_step(&guarded, &mut ctx).await.unwrap();
        assert_eq!(result.result(), Some(&json!({ "echo": "guarded" })));
    }

    // -------------------------------------------------------------------
    // Success, timeout, failure policies
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn success_emits_started_then_completed() {
        let executor = executor_with(Echo);
        let log = executor.events().record();
        let mut ctx = ExecutionContext::new("wf");

        let result = executor.execute_step(&click("s1"), &mut ctx).await.unwrap();
        assert_eq!(result.status, StepStatus::Completed);
        assert_eq!(result.attempt, 1);
        assert_eq!(ctx.results().len(), 1);

        settle(&log, 2).await;
        assert_eq!(log.names(), vec!["step_started", "step_completed"]);
        assert_eq!(executor.stats().active_steps, 0);
    }

    #[tokio::test]
    async fn timeout_names_the_budget() {
        let executor = executor_with(Sleepy(500));
        let mut ctx = ExecutionContext::new("wf").with_retry_enabled(false);
        let step = click("slow").with_timeout(50);

        let err = executor.execute_step(&step, &mut ctx).await.unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.error.kind, ErrorKind::Timeout);
        assert!(report.error.message.contains("50ms"));
        assert_eq!(report.recommendation, Recommendation::AbortExecution);
    }

    #[tokio::test]
    async fn transient_failure_recovers_and_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = executor_with(Flaky {
            failures: 1,
            calls: Arc::clone(&calls),
            error: StepError::ElementNotFound {
                selector: "#btn".into(),
            },
        });
        let log = executor.events().record();
        let mut ctx = ExecutionContext::new("wf");

        let result = executor.execute_step(&click("s1"), &mut ctx).await.unwrap();
        assert_eq!(result.attempt, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.metrics().retries, 1);

        settle(&log, 4).await;
        assert_eq!(
            log.names(),
            vec!["step_started", "step_failed", "step_started", "step_completed"]
        );
        match &log.events()[1] {
            StepEvent::StepFailed { will_retry, .. } => assert!(*will_retry),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_transient_failure_fails_without_recovery() {
        let executor = executor_with(Failing(StepError::handler("invalid credentials")));
        let mut ctx = ExecutionContext::new("wf");

        let err = executor.execute_step(&click("s1"), &mut ctx).await.unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.recovery_attempts, 0);
        assert!(report.strategy.is_none());
        assert!(matches!(err, ExecutorError::StepFailed(_)));
    }

    #[tokio::test]
    async fn exhausted_recovery_reports_strategy() {
        let executor = executor_with(Failing(StepError::Network("socket hang up".into())));
        let mut ctx = ExecutionContext::new("wf");

        let err = executor.execute_step(&click("s1"), &mut ctx).await.unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.strategy, Some(RecoveryStrategyKind::RetryOperation));
        assert_eq!(report.classification.unwrap().category, ErrorCategory::NetworkError);
        // Three recovery retries allowed; each success re-dispatches.
        assert_eq!(report.recovery_attempts, 3);
        assert_eq!(report.attempts, 4);
    }

    #[tokio::test]
    async fn fatal_error_aborts_immediately() {
        let executor = executor_with(Failing(StepError::fatal("browser gone")));
        let mut ctx = ExecutionContext::new("wf");
        let mut step = click("s1");
        step.on_error = Some(stepforge_types::step::OnError {
            action: ErrorAction::Retry,
        });

        let err = executor.execute_step(&step, &mut ctx).await.unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.recovery_attempts, 0);
        assert_eq!(report.strategy, Some(RecoveryStrategyKind::Abort));
        assert_eq!(report.recommendation, Recommendation::AbortExecution);
    }

    #[tokio::test]
    async fn continue_on_error_completes_with_warning() {
        let executor = executor_with(Failing(StepError::handler("boom")));
        let log = executor.events().record();
        let mut ctx = ExecutionContext::new("wf");
        let mut step = click("s1");
        step.continue_on_error = true;

        let result = executor.execute_step(&step, &mut ctx).await.unwrap();
        assert_eq!(result.status, StepStatus::Completed);
        assert_eq!(result.warning(), Some("boom"));

        settle(&log, 3).await;
        assert_eq!(log.names(), vec!["step_started", "step_failed", "step_completed"]);
    }

    #[tokio::test]
    async fn on_error_pause_requests_pause() {
        let executor = executor_with(Failing(StepError::handler("captcha")));
        let mut ctx = ExecutionContext::new("wf");
        let step = click("s1").with_on_error(ErrorAction::Pause);

        let err = executor.execute_step(&step, &mut ctx).await.unwrap_err();
        assert!(matches!(err, ExecutorError::PauseRequested(_)));
        assert_eq!(err.report().unwrap().recommendation, Recommendation::Pause);
    }

    // -------------------------------------------------------------------
    // Cancellation
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn cancel_step_discards_handler_result() {
        let executor = Arc::new(executor_with(Sleepy(100)));
        let log = executor.events().record();
        let mut ctx = ExecutionContext::new("wf");
        let run_id = ctx.run_id;

        let canceller = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                for _ in 0..50 {
                    if executor.cancel_step(run_id, "s1").is_ok() {
                        return true;
                    }
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                false
            })
        };

        let err = executor.execute_step(&click("s1"), &mut ctx).await.unwrap_err();
        assert!(canceller.await.unwrap());
        match err {
            ExecutorError::Cancelled { result, .. } => {
                assert_eq!(result.status, StepStatus::Cancelled);
                assert!(result.result().is_none());
            }
            other => panic!("expected cancellation, got {other:?}"),
        }

        settle(&log, 2).await;
        let names = log.names();
        assert_eq!(names.iter().filter(|n| **n == "step_cancelled").count(), 1);
        assert!(!names.contains(&"step_completed"));
    }

    #[tokio::test]
    async fn cancel_during_wait_after_is_refused() {
        let executor = Arc::new(executor_with(Echo));
        let log = executor.events().record();
        let mut ctx = ExecutionContext::new("wf");
        let run_id = ctx.run_id;
        let mut step = click("s1");
        step.wait_after_ms = Some(100);

        let mut events = executor.events().subscribe();
        let canceller = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    if event.name() == "step_completed" {
                        return executor.cancel_step(run_id, "s1");
                    }
                }
                Ok(())
            })
        };

        let result = executor.execute_step(&step, &mut ctx).await.unwrap();
        assert_eq!(result.status, StepStatus::Completed);
        let refused = canceller.await.unwrap().unwrap_err();
        assert!(matches!(refused, ExecutorError::StepNotActive(_)));

        settle(&log, 2).await;
        assert!(!log.names().contains(&"step_cancelled"));
    }

    #[test]
    fn cancel_unknown_step_is_not_active() {
        let executor = StepExecutor::new(&EngineConfig::default());
        let err = executor.cancel_step(Uuid::now_v7(), "ghost").unwrap_err();
        assert!(matches!(err, ExecutorError::StepNotActive(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn cancelled_run_token_stops_before_dispatch() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = executor_with(Flaky {
            failures: 0,
            calls: Arc::clone(&calls),
            error: StepError::handler("unused"),
        });
        let mut ctx = ExecutionContext::new("wf");
        ctx.cancellation().cancel();

        let err = executor.execute_step(&click("s1"), &mut ctx).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Cancelled { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    // -------------------------------------------------------------------
    // Registry and stats
    // -------------------------------------------------------------------

    #[test]
    fn ensure_handlers_reports_missing_types() {
        let executor = executor_with(Echo);
        assert_eq!(executor.ensure_handlers(&[StepType::Interaction]), Ok(()));
        let missing = executor.ensure_handlers(&StepType::ALL).unwrap_err();
        assert_eq!(missing.len(), 5);
        assert!(!missing.contains(&StepType::Interaction));

        let stats = executor.stats();
        assert_eq!(stats.registered_handlers, 1);
        assert_eq!(stats.handler_types, vec![StepType::Interaction]);
    }
}
