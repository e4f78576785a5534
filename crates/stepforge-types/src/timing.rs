//! Wait strategies and the telemetry they are computed from.

use serde::{Deserialize, Serialize};

/// A completion condition a caller waits for after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitCondition {
    NetworkIdle,
    DomContentLoaded,
    ElementVisible,
    ElementStable,
    FixedDelay,
}

impl std::fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WaitCondition::NetworkIdle => "network-idle",
            WaitCondition::DomContentLoaded => "dom-content-loaded",
            WaitCondition::ElementVisible => "element-visible",
            WaitCondition::ElementStable => "element-stable",
            WaitCondition::FixedDelay => "fixed-delay",
        };
        f.write_str(s)
    }
}

/// Timeout plus the primary and fallback completion conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitStrategy {
    pub timeout_ms: u64,
    pub strategy: WaitCondition,
    pub fallback_strategies: Vec<WaitCondition>,
}

/// Current network estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkConditions {
    pub latency_ms: f64,
    /// Estimated downstream throughput in kilobits per second.
    pub throughput_kbps: f64,
}

impl Default for NetworkConditions {
    fn default() -> Self {
        Self {
            latency_ms: 50.0,
            throughput_kbps: 10_000.0,
        }
    }
}

/// DOM statistics of the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageComplexity {
    pub dom_nodes: u32,
    pub scripts: u32,
    pub stylesheets: u32,
    pub images: u32,
}

/// Historical timing for one selector key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalTiming {
    pub average_ms: f64,
    /// Fraction of successful executions, in `[0, 1]`.
    pub success_rate: f64,
    pub samples: u32,
}
