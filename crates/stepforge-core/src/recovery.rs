//! Error classification and bounded recovery.
//!
//! `ErrorRecoveryFramework` classifies a step failure, picks a strategy for
//! the category, and runs that strategy's recovery routine with exponential
//! backoff. It never re-runs the step itself: a successful recovery tells
//! the executor the step is worth another attempt.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use stepforge_types::config::RecoveryConfig;
use stepforge_types::error::{ErrorKind, FATAL_ERROR_CODE, StepError};
use stepforge_types::recovery::{
    ErrorCategory, ErrorClassification, Recommendation, RecoveryOutcome, RecoveryStrategy,
    RecoveryStrategyKind, Severity,
};
use stepforge_types::step::{ActionKind, Step};
use tokio_util::sync::CancellationToken;

use crate::page::BoxPage;
use crate::resolver::ElementResolver;

static TIMEOUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)timeout|timed out").expect("valid regex"));
static NETWORK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)network|connection|econn|socket|dns").expect("valid regex")
});
static ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)element.*not.*found|no such element|not interactable").expect("valid regex")
});
static PERMISSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)permission|forbidden|unauthori[sz]ed|access denied").expect("valid regex")
});

/// Inputs the recovery routines may use.
pub struct RecoveryContext<'a> {
    pub step: &'a Step,
    pub page: Option<&'a BoxPage>,
    pub cancel: &'a CancellationToken,
    /// Recovery attempts already spent on this step. Backoff continues from
    /// here so delays keep growing across step attempts.
    pub prior_attempts: u32,
}

pub struct ErrorRecoveryFramework {
    config: RecoveryConfig,
    resolver: Option<Arc<ElementResolver>>,
}

impl ErrorRecoveryFramework {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            resolver: None,
        }
    }

    /// Enable re-resolution for element-not-found recovery.
    pub fn with_resolver(mut self, resolver: Arc<ElementResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Classify `error`, typed kinds first and message patterns second.
    /// `ctx`, when given, refines errors the message alone cannot place.
    pub fn classify_error(
        &self,
        error: &StepError,
        ctx: Option<&RecoveryContext<'_>>,
    ) -> ErrorClassification {
        if error.kind() == ErrorKind::Fatal || error.code() == Some(FATAL_ERROR_CODE) {
            return classification(ErrorCategory::Fatal, Severity::Fatal, 1.0);
        }

        match error.kind() {
            ErrorKind::Timeout => {
                return classification(ErrorCategory::TimeoutError, Severity::Recoverable, 1.0);
            }
            ErrorKind::ElementNotFound => {
                return classification(ErrorCategory::ElementNotFound, Severity::Recoverable, 1.0);
            }
            ErrorKind::Network | ErrorKind::Connection => {
                return classification(ErrorCategory::NetworkError, Severity::Recoverable, 1.0);
            }
            ErrorKind::PermissionDenied => {
                return classification(ErrorCategory::PermissionDenied, Severity::Fatal, 1.0);
            }
            _ => {}
        }

        let message = error.to_string();
        if TIMEOUT_RE.is_match(&message) {
            classification(ErrorCategory::TimeoutError, Severity::Recoverable, 0.9)
        } else if NETWORK_RE.is_match(&message) {
            classification(ErrorCategory::NetworkError, Severity::Recoverable, 0.85)
        } else if ELEMENT_RE.is_match(&message) {
            classification(ErrorCategory::ElementNotFound, Severity::Recoverable, 0.85)
        } else if PERMISSION_RE.is_match(&message) {
            classification(ErrorCategory::PermissionDenied, Severity::Fatal, 0.8)
        } else if ctx.is_some_and(|c| c.step.action == Some(ActionKind::Navigate)) {
            // Unrecognised navigation failures are treated as transport errors.
            classification(ErrorCategory::NetworkError, Severity::Recoverable, 0.5)
        } else {
            classification(ErrorCategory::Unknown, Severity::Recoverable, 0.3)
        }
    }

    pub fn select_recovery_strategy(&self, c: &ErrorClassification) -> RecoveryStrategy {
        let backoff = self.config.backoff();
        let (kind, max_retries) = match c.category {
            ErrorCategory::ElementNotFound => (
                RecoveryStrategyKind::AlternativeSelectors,
                self.config.element_not_found_retries,
            ),
            ErrorCategory::NetworkError => {
                (RecoveryStrategyKind::RetryOperation, self.config.network_retries)
            }
            ErrorCategory::TimeoutError => {
                (RecoveryStrategyKind::ExtendedWait, self.config.timeout_retries)
            }
            ErrorCategory::PermissionDenied => (RecoveryStrategyKind::Escalate, 0),
            ErrorCategory::Unknown => {
                (RecoveryStrategyKind::SingleRetry, self.config.unknown_retries)
            }
            ErrorCategory::Fatal => (RecoveryStrategyKind::Abort, 0),
        };
        RecoveryStrategy {
            kind,
            max_retries,
            backoff,
        }
    }

    /// What to do once recovery can no longer help.
    pub fn terminal_recommendation(&self, c: &ErrorClassification) -> Recommendation {
        match c.category {
            ErrorCategory::PermissionDenied => Recommendation::Pause,
            _ => Recommendation::AbortExecution,
        }
    }

    pub async fn attempt_recovery(
        &self,
        error: &StepError,
        ctx: &RecoveryContext<'_>,
    ) -> RecoveryOutcome {
        let classification = self.classify_error(error, Some(ctx));
        let strategy = self.select_recovery_strategy(&classification);
        let mut outcome = RecoveryOutcome {
            success: false,
            classification,
            strategy,
            attempts: 0,
            delays_ms: Vec::new(),
            recommendation: self.terminal_recommendation(&classification),
        };

        if classification.severity == Severity::Fatal {
            tracing::warn!(
                step_id = ctx.step.id.as_str(),
                category = %classification.category,
                "unrecoverable error, no recovery attempted"
            );
            return outcome;
        }

        for n in ctx.prior_attempts..strategy.max_retries {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let delay = strategy.backoff.delay_ms(n);
            outcome.delays_ms.push(delay);
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
            }

            outcome.attempts += 1;
            let ready = self.run_routine(strategy.kind, ctx).await;
            tracing::debug!(
                step_id = ctx.step.id.as_str(),
                strategy = %strategy.kind,
                attempt = n + 1,
                delay_ms = delay,
                ready,
                "recovery attempt"
            );
            if ready {
                outcome.success = true;
                outcome.recommendation = Recommendation::Retry;
                break;
            }
        }

        if !outcome.success && ctx.step.continue_on_error {
            outcome.recommendation = Recommendation::Continue;
        }
        outcome
    }

    /// Whether the page is in a state where re-running the step can help.
    async fn run_routine(&self, kind: RecoveryStrategyKind, ctx: &RecoveryContext<'_>) -> bool {
        let Some(page) = ctx.page else {
            // Nothing to probe: the backoff itself is the recovery.
            return true;
        };
        match kind {
            RecoveryStrategyKind::AlternativeSelectors => {
                match (&self.resolver, &ctx.step.target) {
                    (Some(resolver), Some(target)) => {
                        matches!(resolver.find_element(target, page).await, Ok(Some(_)))
                    }
                    _ => true,
                }
            }
            RecoveryStrategyKind::RetryOperation => page.current_url().await.is_ok(),
            RecoveryStrategyKind::ExtendedWait => page.dom_complexity().await.is_ok(),
            RecoveryStrategyKind::SingleRetry => true,
            RecoveryStrategyKind::Escalate | RecoveryStrategyKind::Abort => false,
        }
    }
}

fn classification(category: ErrorCategory, severity: Severity, confidence: f64) -> ErrorClassification {
    ErrorClassification {
        category,
        severity,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepforge_types::config::ResolverConfig;
    use stepforge_types::error::PageError;
    use stepforge_types::selector::Selector;
    use stepforge_types::step::{ActionKind, StepType};

    use crate::repository::selector::NoopSelectorStore;
    use crate::testutil::{MockPage, element};

    fn framework() -> ErrorRecoveryFramework {
        ErrorRecoveryFramework::new(RecoveryConfig {
            base_delay_ms: 2,
            max_delay_ms: 1_000,
            ..Default::default()
        })
    }

    fn step() -> Step {
        Step::new("s1", StepType::Interaction, ActionKind::Click).with_target(Selector::new("#btn"))
    }

    // -------------------------------------------------------------------
    // classify_error
    // -------------------------------------------------------------------

    #[test]
    fn timeout_messages_classify_as_timeout() {
        let f = framework();
        let c = f.classify_error(&StepError::handler("Operation TIMEOUT while waiting"), None);
        assert_eq!(c.category, ErrorCategory::TimeoutError);
        assert!(c.is_recoverable());

        let timeout = StepError::Timeout {
            step_id: "s".into(),
            timeout_ms: 100,
        };
        let c = f.classify_error(&timeout, None);
        assert_eq!(c.category, ErrorCategory::TimeoutError);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn fatal_code_is_fatal() {
        let f = framework();
        let fatal = StepError::with_code("browser went away", FATAL_ERROR_CODE);
        let c = f.classify_error(&fatal, None);
        assert_eq!(c.category, ErrorCategory::Fatal);
        assert_eq!(c.severity, Severity::Fatal);
        assert!(!c.is_recoverable());
    }

    #[test]
    fn network_and_element_messages() {
        let f = framework();
        assert_eq!(
            f.classify_error(&StepError::handler("Connection reset by peer"), None).category,
            ErrorCategory::NetworkError
        );
        assert_eq!(
            f.classify_error(&PageError::ElementNotFound("#x".into()).into(), None).category,
            ErrorCategory::ElementNotFound
        );
        assert_eq!(
            f.classify_error(&StepError::handler("403 Forbidden"), None).category,
            ErrorCategory::PermissionDenied
        );
        assert_eq!(
            f.classify_error(&StepError::handler("something odd"), None).category,
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn context_places_unrecognised_navigation_failures() {
        let f = framework();
        let error = StepError::handler("something odd");
        let cancel = CancellationToken::new();
        let navigate = Step::new("go", StepType::Navigation, ActionKind::Navigate);
        let ctx = RecoveryContext {
            step: &navigate,
            page: None,
            cancel: &cancel,
            prior_attempts: 0,
        };
        let c = f.classify_error(&error, Some(&ctx));
        assert_eq!(c.category, ErrorCategory::NetworkError);
        assert!(c.is_recoverable());

        let click = step();
        let ctx = RecoveryContext { step: &click, ..ctx };
        assert_eq!(f.classify_error(&error, Some(&ctx)).category, ErrorCategory::Unknown);
    }

    // -------------------------------------------------------------------
    // select_recovery_strategy
    // -------------------------------------------------------------------

    #[test]
    fn strategies_are_bounded_per_category() {
        let f = framework();
        let pick = |category, severity| {
            f.select_recovery_strategy(&ErrorClassification {
                category,
                severity,
                confidence: 1.0,
            })
        };
        let s = pick(ErrorCategory::ElementNotFound, Severity::Recoverable);
        assert_eq!(s.kind, RecoveryStrategyKind::AlternativeSelectors);
        assert_eq!(s.max_retries, 3);
        assert_eq!(
            pick(ErrorCategory::NetworkError, Severity::Recoverable).kind,
            RecoveryStrategyKind::RetryOperation
        );
        assert_eq!(pick(ErrorCategory::Unknown, Severity::Recoverable).max_retries, 1);
        assert_eq!(pick(ErrorCategory::Fatal, Severity::Fatal).max_retries, 0);
    }

    // -------------------------------------------------------------------
    // attempt_recovery
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn fatal_aborts_without_attempts() {
        let f = framework();
        let step = step();
        let cancel = CancellationToken::new();
        let outcome = f
            .attempt_recovery(
                &StepError::fatal("unrecoverable"),
                &RecoveryContext {
                    step: &step,
                    page: None,
                    cancel: &cancel,
                    prior_attempts: 0,
                },
            )
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.recommendation, Recommendation::AbortExecution);
        assert_eq!(outcome.attempts, 0);
        assert!(outcome.delays_ms.is_empty());
    }

    #[tokio::test]
    async fn delays_strictly_increase_across_attempts() {
        let f = framework();
        let step = step();
        let cancel = CancellationToken::new();
        // Disconnected page: every network probe fails, so all retries run.
        let page = BoxPage::new(MockPage::new().disconnected());
        let outcome = f
            .attempt_recovery(
                &StepError::Network("socket hang up".into()),
                &RecoveryContext {
                    step: &step,
                    page: Some(&page),
                    cancel: &cancel,
                    prior_attempts: 0,
                },
            )
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.delays_ms, vec![2, 4, 8]);
        assert!(outcome.delays_ms.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn backoff_continues_from_prior_attempts() {
        let f = framework();
        let step = step();
        let cancel = CancellationToken::new();
        let outcome = f
            .attempt_recovery(
                &StepError::Network("socket hang up".into()),
                &RecoveryContext {
                    step: &step,
                    page: None,
                    cancel: &cancel,
                    prior_attempts: 1,
                },
            )
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.delays_ms, vec![4]);
        assert_eq!(outcome.recommendation, Recommendation::Retry);
    }

    #[tokio::test]
    async fn exhausted_budget_makes_no_attempt() {
        let f = framework();
        let step = step();
        let cancel = CancellationToken::new();
        let outcome = f
            .attempt_recovery(
                &StepError::handler("weird"),
                &RecoveryContext {
                    step: &step,
                    page: None,
                    cancel: &cancel,
                    prior_attempts: 1,
                },
            )
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(outcome.recommendation, Recommendation::AbortExecution);
    }

    #[tokio::test]
    async fn element_recovery_re_resolves_target() {
        let resolver = Arc::new(ElementResolver::new(
            Arc::new(NoopSelectorStore),
            &ResolverConfig::default(),
        ));
        let f = framework().with_resolver(resolver);
        let step = Step::new("s1", StepType::Interaction, ActionKind::Click)
            .with_target(Selector::new("#gone").with_fallbacks(["#here"]));
        let page = BoxPage::new(MockPage::new().with_element("#here", element("h", "button")));
        let cancel = CancellationToken::new();

        let outcome = f
            .attempt_recovery(
                &StepError::ElementNotFound {
                    selector: "#gone".into(),
                },
                &RecoveryContext {
                    step: &step,
                    page: Some(&page),
                    cancel: &cancel,
                    prior_attempts: 0,
                },
            )
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.strategy.kind, RecoveryStrategyKind::AlternativeSelectors);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_backoff() {
        let f = framework();
        let step = step();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = f
            .attempt_recovery(
                &StepError::Network("down".into()),
                &RecoveryContext {
                    step: &step,
                    page: None,
                    cancel: &cancel,
                    prior_attempts: 0,
                },
            )
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 0);
        assert!(outcome.delays_ms.is_empty());
    }

    #[tokio::test]
    async fn permission_denied_recommends_pause() {
        let f = framework();
        let step = step();
        let cancel = CancellationToken::new();
        let outcome = f
            .attempt_recovery(
                &StepError::PermissionDenied("camera".into()),
                &RecoveryContext {
                    step: &step,
                    page: None,
                    cancel: &cancel,
                    prior_attempts: 0,
                },
            )
            .await;
        assert_eq!(outcome.attempts, 0);
        assert_eq!(outcome.recommendation, Recommendation::Pause);
    }
}
