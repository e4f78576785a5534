//! Error classification and recovery descriptors.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    ElementNotFound,
    NetworkError,
    TimeoutError,
    PermissionDenied,
    Fatal,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::ElementNotFound => "element-not-found",
            ErrorCategory::NetworkError => "network-error",
            ErrorCategory::TimeoutError => "timeout-error",
            ErrorCategory::PermissionDenied => "permission-denied",
            ErrorCategory::Fatal => "fatal",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Recoverable,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub severity: Severity,
    /// How sure the classifier is, in `[0, 1]`.
    pub confidence: f64,
}

impl ErrorClassification {
    pub fn is_recoverable(&self) -> bool {
        self.severity == Severity::Recoverable
    }
}

/// Exponential backoff: `delay(n) = min(base * 2^n, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Delay before retry `n` (0-based).
    pub fn delay_ms(&self, n: u32) -> u64 {
        let factor = 1u64.checked_shl(n.min(63)).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(500, 30_000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryStrategyKind {
    /// Re-resolve the target through fallbacks, then visual and semantic matching.
    AlternativeSelectors,
    /// Probe the page and re-run the whole operation.
    RetryOperation,
    /// Wait for the page to become responsive, then re-run with a longer budget.
    ExtendedWait,
    /// One conservative retry.
    SingleRetry,
    /// Needs a human; no automatic retry.
    Escalate,
    /// Give up immediately.
    Abort,
}

impl std::fmt::Display for RecoveryStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecoveryStrategyKind::AlternativeSelectors => "alternative-selectors",
            RecoveryStrategyKind::RetryOperation => "retry-operation",
            RecoveryStrategyKind::ExtendedWait => "extended-wait",
            RecoveryStrategyKind::SingleRetry => "single-retry",
            RecoveryStrategyKind::Escalate => "escalate",
            RecoveryStrategyKind::Abort => "abort",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    pub kind: RecoveryStrategyKind,
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
}

/// What the orchestrator should do once recovery has run its course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    Continue,
    Retry,
    Pause,
    AbortExecution,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Recommendation::Continue => "continue",
            Recommendation::Retry => "retry",
            Recommendation::Pause => "pause",
            Recommendation::AbortExecution => "abort-execution",
        };
        f.write_str(s)
    }
}

/// Result of one `attempt_recovery` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub classification: ErrorClassification,
    pub strategy: RecoveryStrategy,
    /// Recovery routine invocations actually made.
    pub attempts: u32,
    /// Backoff delay slept before each attempt, in order.
    pub delays_ms: Vec<u64>,
    pub recommendation: Recommendation,
}

/// Per-attempt state of a step.
///
/// `Pending -> Running -> {Completed | Failed}`,
/// `Failed -> Recovering -> {Running | Failed}`, `Running -> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Pending,
    Running,
    Recovering,
    Completed,
    Failed,
    Cancelled,
}

impl AttemptState {
    pub fn can_transition_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Failed, Recovering)
                | (Recovering, Running)
                | (Recovering, Failed)
                | (Recovering, Cancelled)
        )
    }

    /// Terminal states admit no further transitions, except that a
    /// recoverable `Failed` may still enter `Recovering`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptState::Completed | AttemptState::Failed | AttemptState::Cancelled
        )
    }
}
