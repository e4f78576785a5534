//! Engine configuration types.
//!
//! `EngineConfig` mirrors `config.toml` in the data directory. Every field
//! has a default, so an empty file (or no file) yields a working engine.

use serde::{Deserialize, Serialize};

use crate::recovery::BackoffPolicy;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Handler budget when a step sets no `timeout`.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Whether failed steps are handed to recovery at all.
    #[serde(default = "default_true")]
    pub retry_enabled: bool,
    /// Hard ceiling on handler invocations per step, recovery included.
    #[serde(default = "default_max_step_attempts")]
    pub max_step_attempts: u32,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_max_step_attempts() -> u32 {
    4
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            retry_enabled: true,
            max_step_attempts: default_max_step_attempts(),
            event_capacity: default_event_capacity(),
        }
    }
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_navigation_base_ms")]
    pub navigation_base_ms: u64,
    /// click / hover / scroll
    #[serde(default = "default_interaction_base_ms")]
    pub interaction_base_ms: u64,
    /// type / select
    #[serde(default = "default_input_base_ms")]
    pub input_base_ms: u64,
    #[serde(default = "default_other_base_ms")]
    pub default_base_ms: u64,
    /// Latency at or below which the network is considered fast.
    #[serde(default = "default_fast_latency_ms")]
    pub fast_latency_ms: f64,
    /// Throughput at or above which the network is considered fast.
    #[serde(default = "default_fast_throughput_kbps")]
    pub fast_throughput_kbps: f64,
    /// DOM node count at which complexity starts to add time.
    #[serde(default = "default_dom_nodes_threshold")]
    pub dom_nodes_threshold: u32,
    #[serde(default = "default_max_multiplier")]
    pub max_multiplier: f64,
    /// Historical averages are clamped to this before biasing.
    #[serde(default = "default_max_history_ms")]
    pub max_history_ms: f64,
    /// Poll interval while waiting for an element.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_navigation_base_ms() -> u64 {
    30_000
}

fn default_interaction_base_ms() -> u64 {
    10_000
}

fn default_input_base_ms() -> u64 {
    5_000
}

fn default_other_base_ms() -> u64 {
    10_000
}

fn default_fast_latency_ms() -> f64 {
    100.0
}

fn default_fast_throughput_kbps() -> f64 {
    5_000.0
}

fn default_dom_nodes_threshold() -> u32 {
    1_500
}

fn default_max_multiplier() -> f64 {
    2.5
}

fn default_max_history_ms() -> f64 {
    120_000.0
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            navigation_base_ms: default_navigation_base_ms(),
            interaction_base_ms: default_interaction_base_ms(),
            input_base_ms: default_input_base_ms(),
            default_base_ms: default_other_base_ms(),
            fast_latency_ms: default_fast_latency_ms(),
            fast_throughput_kbps: default_fast_throughput_kbps(),
            dom_nodes_threshold: default_dom_nodes_threshold(),
            max_multiplier: default_max_multiplier(),
            max_history_ms: default_max_history_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_element_retries")]
    pub element_not_found_retries: u32,
    #[serde(default = "default_network_retries")]
    pub network_retries: u32,
    #[serde(default = "default_timeout_retries")]
    pub timeout_retries: u32,
    #[serde(default = "default_unknown_retries")]
    pub unknown_retries: u32,
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_element_retries() -> u32 {
    3
}

fn default_network_retries() -> u32 {
    3
}

fn default_timeout_retries() -> u32 {
    2
}

fn default_unknown_retries() -> u32 {
    1
}

impl RecoveryConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.base_delay_ms, self.max_delay_ms)
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            element_not_found_retries: default_element_retries(),
            network_retries: default_network_retries(),
            timeout_retries: default_timeout_retries(),
            unknown_retries: default_unknown_retries(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Minimum visual similarity for a candidate to be accepted.
    #[serde(default = "default_visual_threshold")]
    pub visual_threshold: f64,
    /// Minimum semantic score for a candidate to be accepted.
    #[serde(default = "default_semantic_floor")]
    pub semantic_floor: f64,
    /// Reorder fallbacks by learned confidence instead of declared order.
    #[serde(default)]
    pub learning_order: bool,
}

fn default_visual_threshold() -> f64 {
    0.8
}

fn default_semantic_floor() -> f64 {
    0.5
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            visual_threshold: default_visual_threshold(),
            semantic_floor: default_semantic_floor(),
            learning_order: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.executor.default_timeout_ms, 30_000);
        assert!(config.executor.retry_enabled);
        assert_eq!(config.resolver.visual_threshold, 0.8);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
[executor]
default_timeout_ms = 5000
retry_enabled = false

[timing]
navigation_base_ms = 45000

[recovery]
base_delay_ms = 50
"#,
        )
        .unwrap();
        assert_eq!(config.executor.default_timeout_ms, 5_000);
        assert!(!config.executor.retry_enabled);
        assert_eq!(config.executor.event_capacity, 1024);
        assert_eq!(config.timing.navigation_base_ms, 45_000);
        assert_eq!(config.timing.input_base_ms, 5_000);
        assert_eq!(config.recovery.backoff(), BackoffPolicy::new(50, 30_000));
        assert_eq!(config.recovery.network_retries, 3);
    }

    #[test]
    fn base_timeouts_are_ordered_by_default() {
        let t = TimingConfig::default();
        assert!(t.navigation_base_ms > t.interaction_base_ms);
        assert!(t.interaction_base_ms > t.input_base_ms);
    }
}
