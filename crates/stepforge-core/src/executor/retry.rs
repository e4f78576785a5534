//! Failure policy for a step attempt.
//!
//! Stateless: everything is decided from the step, the error and the run's
//! retry switch. Whether recovery then succeeds is up to the recovery
//! framework.

use std::sync::LazyLock;

use regex::Regex;
use stepforge_types::error::StepError;
use stepforge_types::step::{ErrorAction, Step};

static RETRYABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)timeout|network|connection|element.*not.*found|page.*loading|temporary")
        .expect("valid regex")
});

/// What the executor does with a failed attempt, before recovery runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Hand the failure to the recovery framework.
    Recover,
    /// Finalize as completed-with-warning.
    Skip,
    /// Surface a pause request.
    Pause,
    /// Propagate without recovery.
    Fail,
}

pub struct RetryHandler;

impl RetryHandler {
    /// Whether `error`'s message looks transient.
    pub fn is_retryable(error: &StepError) -> bool {
        RETRYABLE_RE.is_match(&error.to_string())
    }

    /// Decide the policy for a failed attempt.
    ///
    /// An explicit `on_error` wins; then `continue_on_error`; then transient
    /// errors recover when the run allows retries.
    pub fn policy(step: &Step, error: &StepError, retry_enabled: bool) -> FailurePolicy {
        if let Some(on_error) = &step.on_error {
            return match on_error.action {
                ErrorAction::Continue | ErrorAction::Skip => FailurePolicy::Skip,
                ErrorAction::Pause => FailurePolicy::Pause,
                ErrorAction::Fail => FailurePolicy::Fail,
                ErrorAction::Retry if retry_enabled => FailurePolicy::Recover,
                ErrorAction::Retry => FailurePolicy::Fail,
            };
        }
        if step.continue_on_error {
            return FailurePolicy::Skip;
        }
        if retry_enabled && Self::is_retryable(error) {
            FailurePolicy::Recover
        } else {
            FailurePolicy::Fail
        }
    }

    /// Whether another handler invocation fits in the budget. `attempt` is
    /// 1-based.
    pub fn should_retry(attempt: u32, max_attempts: u32) -> bool {
        attempt < max_attempts
    }
}
