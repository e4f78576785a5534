//! Adaptive wait computation.
//!
//! `TimingController::calculate_optimal_wait` turns an action kind plus the
//! current network, page and history picture into a [`WaitStrategy`].
//!
//! ```text
//! baseline = base(action) * network_multiplier * complexity_multiplier
//! timeout  = (baseline + 0.5 * max(0, history_avg - baseline)) * reliability
//! ```
//!
//! Every adjustment is either a shared multiplier or a strictly increasing
//! function of the baseline, so the base ordering
//! navigation > click > type survives any identical context.

use std::time::{Duration, Instant};

use stepforge_types::config::TimingConfig;
use stepforge_types::error::{PageError, StepError};
use stepforge_types::selector::Selector;
use stepforge_types::step::{ActionKind, Step};
use stepforge_types::timing::{
    HistoricalTiming, NetworkConditions, PageComplexity, WaitCondition, WaitStrategy,
};
use tokio_util::sync::CancellationToken;

use crate::page::BoxPage;
use crate::repository::timing::{NetworkTelemetry, TimingHistory};
use crate::resolver::{ElementResolver, Resolution};

/// Share of the gap between history and baseline added to the timeout.
const HISTORY_BIAS: f64 = 0.5;

/// Success rate below which timeouts are stretched.
const RELIABILITY_FLOOR: f64 = 0.8;

/// Samples required before the success rate is trusted.
const MIN_RELIABLE_SAMPLES: u32 = 3;

/// Everything the controller looks at for one decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingContext {
    pub network: NetworkConditions,
    pub complexity: PageComplexity,
    pub history: Option<HistoricalTiming>,
}

#[derive(Debug, Clone)]
pub struct TimingController {
    config: TimingConfig,
}

impl TimingController {
    pub fn new(config: TimingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    pub fn calculate_optimal_wait(&self, action: ActionKind, ctx: &TimingContext) -> WaitStrategy {
        let (base_ms, strategy, fallback_strategies) = self.base_for(action);

        let baseline = base_ms as f64
            * self.network_multiplier(&ctx.network)
            * self.complexity_multiplier(&ctx.complexity);

        let mut timeout = baseline;
        if let Some(history) = &ctx.history {
            let average = history.average_ms.clamp(0.0, self.config.max_history_ms);
            if average > baseline {
                timeout += HISTORY_BIAS * (average - baseline);
            }
            if history.samples >= MIN_RELIABLE_SAMPLES && history.success_rate < RELIABILITY_FLOOR
            {
                timeout *= 1.0 + (RELIABILITY_FLOOR - history.success_rate.max(0.0));
            }
        }

        WaitStrategy {
            timeout_ms: timeout.round() as u64,
            strategy,
            fallback_strategies,
        }
    }

    /// Base timeout, primary condition and ordered fallbacks per action.
    fn base_for(&self, action: ActionKind) -> (u64, WaitCondition, Vec<WaitCondition>) {
        use WaitCondition::*;
        match action {
            ActionKind::Navigate => (
                self.config.navigation_base_ms,
                NetworkIdle,
                vec![DomContentLoaded, ElementVisible],
            ),
            ActionKind::Click | ActionKind::Hover | ActionKind::Scroll => (
                self.config.interaction_base_ms,
                ElementVisible,
                vec![ElementStable, DomContentLoaded],
            ),
            ActionKind::Type | ActionKind::Select => (
                self.config.input_base_ms,
                ElementStable,
                vec![ElementVisible, DomContentLoaded],
            ),
            ActionKind::Wait
            | ActionKind::Extract
            | ActionKind::Validate
            | ActionKind::Screenshot
            | ActionKind::Custom => (
                self.config.default_base_ms,
                DomContentLoaded,
                vec![ElementVisible, FixedDelay],
            ),
        }
    }

    /// Grows with latency above the fast threshold (up to 2x per extra
    /// second) and with throughput below it (up to 1.5x).
    pub fn network_multiplier(&self, network: &NetworkConditions) -> f64 {
        let latency = if network.latency_ms <= self.config.fast_latency_ms {
            1.0
        } else {
            1.0 + ((network.latency_ms - self.config.fast_latency_ms) / 1000.0).min(1.0)
        };
        let throughput = if network.throughput_kbps >= self.config.fast_throughput_kbps
            || self.config.fast_throughput_kbps <= 0.0
        {
            1.0
        } else {
            let ratio = (network.throughput_kbps / self.config.fast_throughput_kbps).max(0.0);
            1.0 + 0.5 * (1.0 - ratio)
        };
        (latency * throughput).clamp(1.0, self.config.max_multiplier)
    }

    pub fn complexity_multiplier(&self, complexity: &PageComplexity) -> f64 {
        let excess_nodes = complexity
            .dom_nodes
            .saturating_sub(self.config.dom_nodes_threshold);
        let factor = 1.0
            + f64::from(excess_nodes) / 10_000.0
            + f64::from(complexity.scripts) * 0.01
            + f64::from(complexity.stylesheets) * 0.005
            + f64::from(complexity.images) * 0.002;
        factor.clamp(1.0, self.config.max_multiplier)
    }

    /// Gather telemetry for `step`. Page complexity failures degrade to an
    /// empty page rather than failing the step.
    pub async fn context_for(
        &self,
        step: &Step,
        page: Option<&BoxPage>,
        network: &dyn NetworkTelemetry,
        history: &dyn TimingHistory,
    ) -> TimingContext {
        let complexity = match page {
            Some(page) => page.dom_complexity().await.unwrap_or_else(|e| {
                tracing::debug!("dom complexity unavailable: {e}");
                PageComplexity::default()
            }),
            None => PageComplexity::default(),
        };
        TimingContext {
            network: network.current(),
            complexity,
            history: history.lookup(&step.timing_key()),
        }
    }

    /// Poll the resolver until the element satisfies `strategy.strategy`,
    /// the wait budget runs out, or `cancel` fires. The token is checked
    /// before every poll and during every sleep.
    ///
    /// An element that is present but still misses the primary condition
    /// once half the budget has passed is accepted under the first fallback
    /// condition it meets. The satisfied condition is recorded on the
    /// returned [`Resolution`].
    pub async fn wait_for_element(
        &self,
        step_id: &str,
        resolver: &ElementResolver,
        selector: &Selector,
        page: &BoxPage,
        strategy: &WaitStrategy,
        cancel: &CancellationToken,
    ) -> Result<Resolution, StepError> {
        let started = Instant::now();
        let budget = Duration::from_millis(strategy.timeout_ms);
        let deadline = started + budget;
        let degrade_at = started + budget / 2;
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));

        loop {
            if cancel.is_cancelled() {
                return Err(StepError::Cancelled {
                    step_id: step_id.to_string(),
                });
            }
            // Present but short of every acceptable condition so far.
            let unmet = match resolver.find_element(selector, page).await? {
                Some(mut found) => {
                    if satisfies(strategy.strategy, &found) {
                        found.condition = Some(strategy.strategy);
                        return Ok(found);
                    }
                    if Instant::now() >= degrade_at {
                        if let Some(fallback) = first_met(&strategy.fallback_strategies, &found) {
                            tracing::debug!(
                                step_id,
                                primary = %strategy.strategy,
                                %fallback,
                                "wait condition degraded"
                            );
                            found.condition = Some(fallback);
                            return Ok(found);
                        }
                    }
                    Some(found)
                }
                None => None,
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(match unmet {
                    Some(found) => StepError::Page(PageError::NotInteractable {
                        handle: found.element.handle,
                        reason: format!("never reached {}", strategy.strategy),
                    }),
                    None => StepError::ElementNotFound {
                        selector: selector.primary.clone(),
                    },
                });
            }
            let nap = poll.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

/// Whether a located element meets `condition`. Page-level conditions are
/// met by presence alone.
fn satisfies(condition: WaitCondition, found: &Resolution) -> bool {
    match condition {
        WaitCondition::ElementVisible => found.element.visible,
        WaitCondition::ElementStable
        | WaitCondition::DomContentLoaded
        | WaitCondition::NetworkIdle
        | WaitCondition::FixedDelay => true,
    }
}

fn first_met(fallbacks: &[WaitCondition], found: &Resolution) -> Option<WaitCondition> {
    fallbacks.iter().copied().find(|c| satisfies(*c, found))
}

impl Default for TimingController {
    fn default() -> Self {
        Self::new(TimingConfig::default())
    }
}
