//! Per-run execution state.
//!
//! An `ExecutionContext` is created when a run starts, moved through the
//! executor step by step, and handed back to the caller when the run ends.
//! It is never shared between runs.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use stepforge_types::event::ContextSnapshot;
use stepforge_types::result::{StepResult, StepStatus};
use stepforge_types::step::Step;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::page::BoxPage;

static TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*variables\.([A-Za-z0-9_]+)\s*\}\}").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Logs and metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub step_id: Option<String>,
    pub message: String,
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub steps_completed: u32,
    pub steps_failed: u32,
    pub steps_skipped: u32,
    pub steps_cancelled: u32,
    pub retries: u32,
    pub total_execution_ms: u64,
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

pub struct ExecutionContext {
    pub run_id: Uuid,
    pub workflow_name: String,
    variables: HashMap<String, Value>,
    current_step: usize,
    total_steps: usize,
    logs: Vec<LogEntry>,
    metrics: RunMetrics,
    pub environment: HashMap<String, String>,
    results: Vec<StepResult>,
    /// Whether failed steps may be handed to recovery at all.
    pub retry_enabled: bool,
    page: Option<BoxPage>,
    cancel: CancellationToken,
    step_cancel: Option<CancellationToken>,
}

impl ExecutionContext {
    pub fn new(workflow_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            workflow_name: workflow_name.into(),
            variables: HashMap::new(),
            current_step: 0,
            total_steps: 0,
            logs: Vec::new(),
            metrics: RunMetrics::default(),
            environment: HashMap::new(),
            results: Vec::new(),
            retry_enabled: true,
            page: None,
            cancel: CancellationToken::new(),
            step_cancel: None,
        }
    }

    pub fn with_page(mut self, page: BoxPage) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_variables(mut self, variables: HashMap<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn with_retry_enabled(mut self, enabled: bool) -> Self {
        self.retry_enabled = enabled;
        self
    }

    /// The page this run drives, if any.
    pub fn page(&self) -> Option<&BoxPage> {
        self.page.as_ref()
    }

    // -- variables ----------------------------------------------------------

    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Insert or overwrite a variable. Keys are unique.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn all_variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    // -- progress -----------------------------------------------------------

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn set_progress(&mut self, current_step: usize, total_steps: usize) {
        self.current_step = current_step;
        self.total_steps = total_steps;
    }

    // -- logs, results, metrics ----------------------------------------------

    pub fn log(&mut self, level: LogLevel, step_id: Option<&str>, message: impl Into<String>) {
        self.logs.push(LogEntry {
            timestamp: Utc::now(),
            level,
            step_id: step_id.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    /// Append one attempt's result and update the run counters.
    pub fn record_result(&mut self, result: StepResult) {
        self.metrics.total_execution_ms += result.execution_time_ms;
        match result.status {
            StepStatus::Completed if result.warning().is_some() => self.metrics.steps_skipped += 1,
            StepStatus::Completed => self.metrics.steps_completed += 1,
            StepStatus::Failed => self.metrics.steps_failed += 1,
            StepStatus::Cancelled => self.metrics.steps_cancelled += 1,
        }
        if result.attempt > 1 {
            self.metrics.retries += 1;
        }
        self.results.push(result);
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    // -- cancellation -------------------------------------------------------

    /// Run-level cancellation token. Step tokens are children of it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Token for the step attempt currently executing, if any.
    ///
    /// Handlers should check it at safe points; falls back to the run token
    /// outside of an attempt.
    pub fn step_cancellation(&self) -> &CancellationToken {
        self.step_cancel.as_ref().unwrap_or(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.step_cancellation().is_cancelled()
    }

    pub(crate) fn begin_step(&mut self, token: CancellationToken) {
        self.step_cancel = Some(token);
    }

    pub(crate) fn end_step(&mut self) {
        self.step_cancel = None;
    }

    // -- views --------------------------------------------------------------

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            run_id: self.run_id,
            workflow_name: self.workflow_name.clone(),
            current_step: self.current_step,
            total_steps: self.total_steps,
            variables: self.variables.clone(),
        }
    }

    /// The JSON object custom conditions evaluate against.
    ///
    /// Shape:
    /// ```json
    /// {
    ///   "variables": { ... },
    ///   "step": { "id": "...", "type": "...", ... },
    ///   "workflow": { "name": "...", "run_id": "...", "current_step": 0, "total_steps": 0 }
    /// }
    /// ```
    pub fn to_expression_context(&self, step: &Step) -> Value {
        json!({
            "variables": self.variables,
            "step": serde_json::to_value(step).unwrap_or_else(|_| json!({ "id": step.id })),
            "workflow": {
                "name": self.workflow_name,
                "run_id": self.run_id.to_string(),
                "current_step": self.current_step as f64,
                "total_steps": self.total_steps as f64,
            }
        })
    }

    /// Replace `{{ variables.<name> }}` references with variable values.
    ///
    /// Unknown names are left as written.
    pub fn resolve_template(&self, template: &str) -> String {
        TEMPLATE_RE
            .replace_all(template, |caps: &regex::Captures<'_>| {
                match self.variables.get(&caps[1]) {
                    Some(value) => value_to_string(value),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("workflow_name", &self.workflow_name)
            .field("current_step", &self.current_step)
            .field("total_steps", &self.total_steps)
            .field("variables", &self.variables.len())
            .field("results", &self.results.len())
            .finish_non_exhaustive()
    }
}

/// Render a JSON value for text substitution: strings bare, everything else
/// as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepforge_types::error::StepError;
    use stepforge_types::step::{ActionKind, StepType};

    #[test]
    fn variables_are_unique_by_key() {
        let mut ctx = ExecutionContext::new("wf");
        ctx.set_variable("user", json!("alice"));
        ctx.set_variable("user", json!("bob"));
        assert_eq!(ctx.all_variables().len(), 1);
        assert_eq!(ctx.get_variable("user"), Some(&json!("bob")));
    }

    #[test]
    fn resolve_template_substitutes_known_variables() {
        let mut ctx = ExecutionContext::new("wf");
        ctx.set_variable("email", json!("a@example.test"));
        ctx.set_variable("count", json!(3));
        assert_eq!(
            ctx.resolve_template("{{variables.email}} x{{ variables.count }} {{ variables.missing }}"),
            "a@example.test x3 {{ variables.missing }}"
        );
    }

    #[test]
    fn expression_context_exposes_three_roots() {
        let mut ctx = ExecutionContext::new("checkout");
        ctx.set_progress(2, 5);
        ctx.set_variable("flag", json!(true));
        let step = Step::new("pay", StepType::Interaction, ActionKind::Click);

        let value = ctx.to_expression_context(&step);
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(value["step"]["id"], json!("pay"));
        assert_eq!(value["step"]["type"], json!("interaction"));
        assert_eq!(value["workflow"]["name"], json!("checkout"));
        assert_eq!(value["workflow"]["current_step"], json!(2.0));
        assert_eq!(value["variables"]["flag"], json!(true));
    }

    #[test]
    fn record_result_updates_metrics() {
        let mut ctx = ExecutionContext::new("wf");
        ctx.record_result(StepResult::failed("a", &StepError::handler("boom"), 10, 1));
        ctx.record_result(StepResult::completed("a", json!(null), 15, 2));
        ctx.record_result(StepResult::skipped("b", "precondition not met", 0, 1));

        let m = ctx.metrics();
        assert_eq!(m.steps_completed, 1);
        assert_eq!(m.steps_failed, 1);
        assert_eq!(m.steps_skipped, 1);
        assert_eq!(m.retries, 1);
        assert_eq!(m.total_execution_ms, 25);
        assert_eq!(ctx.results().len(), 3);
    }

    #[test]
    fn step_token_falls_back_to_run_token() {
        let mut ctx = ExecutionContext::new("wf");
        assert!(!ctx.is_cancelled());

        let child = ctx.cancellation().child_token();
        ctx.begin_step(child.clone());
        child.cancel();
        assert!(ctx.is_cancelled());
        assert!(!ctx.cancellation().is_cancelled());

        ctx.end_step();
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn snapshot_copies_progress_and_variables() {
        let mut ctx = ExecutionContext::new("wf");
        ctx.set_progress(1, 4);
        ctx.set_variable("k", json!("v"));
        let snap = ctx.snapshot();
        assert_eq!(snap.run_id, ctx.run_id);
        assert_eq!(snap.current_step, 1);
        assert_eq!(snap.total_steps, 4);
        assert_eq!(snap.variables.get("k"), Some(&json!("v")));
    }
}
