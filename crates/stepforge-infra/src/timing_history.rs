//! Per-selector execution timing table.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use stepforge_core::repository::timing::TimingHistory;
use stepforge_types::timing::HistoricalTiming;

use crate::error::InfraError;
use crate::json_file::{read_json, write_json};

/// Running average and success rate per timing key.
///
/// The first observations are averaged exactly; once `window` samples
/// exist each new one is weighted `1 / window`, so the table follows a
/// page whose speed drifts over time.
#[derive(Debug, Clone)]
pub struct MemoryTimingHistory {
    table: Arc<DashMap<String, HistoricalTiming>>,
    window: u32,
}

const DEFAULT_WINDOW: u32 = 50;

impl Default for MemoryTimingHistory {
    fn default() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }
}

impl MemoryTimingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: u32) -> Self {
        Self {
            table: Arc::new(DashMap::new()),
            window: window.max(1),
        }
    }

    pub async fn load(path: &Path) -> Result<Self, InfraError> {
        let table: DashMap<String, HistoricalTiming> = read_json(path).await?.unwrap_or_default();
        tracing::debug!(path = %path.display(), entries = table.len(), "loaded timing history");
        Ok(Self {
            table: Arc::new(table),
            window: DEFAULT_WINDOW,
        })
    }

    pub async fn save(&self, path: &Path) -> Result<(), InfraError> {
        write_json(path, &*self.table).await
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl TimingHistory for MemoryTimingHistory {
    fn lookup(&self, key: &str) -> Option<HistoricalTiming> {
        self.table.get(key).map(|r| *r.value())
    }

    fn record(&self, key: &str, duration_ms: u64, success: bool) {
        let window = self.window;
        let outcome = if success { 1.0 } else { 0.0 };
        self.table
            .entry(key.to_string())
            .and_modify(|h| {
                let n = f64::from(h.samples.min(window - 1)) + 1.0;
                h.average_ms += (duration_ms as f64 - h.average_ms) / n;
                h.success_rate += (outcome - h.success_rate) / n;
                h.samples = h.samples.saturating_add(1);
            })
            .or_insert(HistoricalTiming {
                average_ms: duration_ms as f64,
                success_rate: outcome,
                samples: 1,
            });
    }
}
