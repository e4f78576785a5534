//! Timing telemetry ports: per-selector history and current network state.

use stepforge_types::timing::{HistoricalTiming, NetworkConditions};

/// Historical per-selector timing table.
pub trait TimingHistory: Send + Sync {
    fn lookup(&self, key: &str) -> Option<HistoricalTiming>;

    /// Fold one observed execution into the table.
    fn record(&self, key: &str, duration_ms: u64, success: bool);
}

/// Source of the current latency/throughput estimate.
pub trait NetworkTelemetry: Send + Sync {
    fn current(&self) -> NetworkConditions;
}

/// A fixed estimate, for callers without live telemetry.
impl NetworkTelemetry for NetworkConditions {
    fn current(&self) -> NetworkConditions {
        *self
    }
}

/// History table that is always empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHistory;

impl TimingHistory for NoHistory {
    fn lookup(&self, _key: &str) -> Option<HistoricalTiming> {
        None
    }

    fn record(&self, _key: &str, _duration_ms: u64, _success: bool) {}
}
