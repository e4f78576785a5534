//! Sampled network telemetry.
//!
//! Callers feed raw latency/throughput observations; the timing controller
//! reads an exponentially weighted moving average. Until the first sample
//! arrives the configured baseline is reported.

use std::sync::Mutex;

use stepforge_core::repository::timing::NetworkTelemetry;
use stepforge_types::timing::NetworkConditions;

/// Weight of the newest sample.
const DEFAULT_ALPHA: f64 = 0.3;

#[derive(Debug)]
pub struct SampledNetworkTelemetry {
    alpha: f64,
    baseline: NetworkConditions,
    estimate: Mutex<Option<NetworkConditions>>,
}

impl Default for SampledNetworkTelemetry {
    fn default() -> Self {
        Self::new(NetworkConditions::default())
    }
}

impl SampledNetworkTelemetry {
    pub fn new(baseline: NetworkConditions) -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            baseline,
            estimate: Mutex::new(None),
        }
    }

    /// Override the smoothing factor; clamped to `(0, 1]`.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = if alpha.is_finite() {
            alpha.clamp(f64::EPSILON, 1.0)
        } else {
            DEFAULT_ALPHA
        };
        self
    }

    /// Fold one observation into the estimate. Negative or non-finite
    /// values are dropped.
    pub fn record_sample(&self, latency_ms: f64, throughput_kbps: f64) {
        if !(latency_ms.is_finite() && throughput_kbps.is_finite())
            || latency_ms < 0.0
            || throughput_kbps < 0.0
        {
            tracing::debug!(latency_ms, throughput_kbps, "dropping invalid network sample");
            return;
        }
        let mut estimate = self.estimate.lock().unwrap_or_else(|p| p.into_inner());
        *estimate = Some(match *estimate {
            None => NetworkConditions {
                latency_ms,
                throughput_kbps,
            },
            Some(prev) => NetworkConditions {
                latency_ms: prev.latency_ms + self.alpha * (latency_ms - prev.latency_ms),
                throughput_kbps: prev.throughput_kbps
                    + self.alpha * (throughput_kbps - prev.throughput_kbps),
            },
        });
    }

    /// Derive a sample from a transfer: `bytes` received in `elapsed_ms`,
    /// of which `latency_ms` was time to first byte.
    pub fn record_transfer(&self, latency_ms: f64, bytes: u64, elapsed_ms: f64) {
        let transfer_ms = (elapsed_ms - latency_ms).max(1.0);
        let kbps = (bytes as f64 * 8.0 / 1000.0) / (transfer_ms / 1000.0);
        self.record_sample(latency_ms, kbps);
    }

    pub fn reset(&self) {
        *self.estimate.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

impl NetworkTelemetry for SampledNetworkTelemetry {
    fn current(&self) -> NetworkConditions {
        self.estimate
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .unwrap_or(self.baseline)
    }
}
