//! Shared application state for CLI commands.
//!
//! Loads the engine config and the learned selector/timing tables from the
//! data directory, and writes the tables back after a run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use stepforge_infra::config::{load_engine_config, resolve_data_dir};
use stepforge_infra::selector_store::MemorySelectorStore;
use stepforge_infra::timing_history::MemoryTimingHistory;
use stepforge_types::config::EngineConfig;

const SELECTORS_FILE: &str = "learning/selectors.json";
const TIMING_FILE: &str = "learning/timing.json";

pub struct AppState {
    pub data_dir: PathBuf,
    pub config: EngineConfig,
    pub selectors: MemorySelectorStore,
    pub history: MemoryTimingHistory,
}

impl AppState {
    pub async fn init() -> Result<Self> {
        Self::init_at(resolve_data_dir()).await
    }

    pub async fn init_at(data_dir: PathBuf) -> Result<Self> {
        let config = load_engine_config(&data_dir).await;
        let selectors = MemorySelectorStore::load(&data_dir.join(SELECTORS_FILE))
            .await
            .context("Failed to load learned selector weights")?;
        let history = MemoryTimingHistory::load(&data_dir.join(TIMING_FILE))
            .await
            .context("Failed to load timing history")?;

        tracing::debug!(
            data_dir = %data_dir.display(),
            selectors = selectors.len(),
            timings = history.len(),
            "application state ready"
        );
        Ok(Self {
            data_dir,
            config,
            selectors,
            history,
        })
    }

    /// Write learned tables back to the data directory.
    pub async fn persist(&self) -> Result<()> {
        self.selectors
            .save(&self.data_dir.join(SELECTORS_FILE))
            .await
            .context("Failed to save selector weights")?;
        self.history
            .save(&self.data_dir.join(TIMING_FILE))
            .await
            .context("Failed to save timing history")?;
        Ok(())
    }
}
