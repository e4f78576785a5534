//! Engine configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.stepforge/` unless
//! `STEPFORGE_HOME` says otherwise) into [`EngineConfig`]. A missing or
//! malformed file yields the defaults.

use std::path::{Path, PathBuf};

use stepforge_types::config::EngineConfig;

pub const CONFIG_FILE: &str = "config.toml";

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`EngineConfig::default()`].
/// - Unreadable or unparsable file: warns and returns the default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => {
            tracing::debug!(path = %config_path.display(), "loaded engine config");
            config
        }
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

/// Resolve the data directory.
///
/// Priority:
/// 1. `STEPFORGE_HOME` environment variable
/// 2. `~/.stepforge`
/// 3. `.stepforge` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("STEPFORGE_HOME") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".stepforge");
    }

    PathBuf::from(".stepforge")
}
