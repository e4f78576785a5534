//! In-memory selector confidence store with JSON snapshots.
//!
//! Backed by `DashMap`, so every concurrent run can read and write
//! without a global lock. Writes are last-writer-wins. Values are copied
//! out on read; no guard outlives a call.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use stepforge_core::repository::selector::SelectorStore;

use crate::error::InfraError;
use crate::json_file::{read_json, write_json};

/// Shared confidence table keyed by `primary::selector`.
///
/// Cloning produces a view of the same table.
#[derive(Debug, Clone, Default)]
pub struct MemorySelectorStore {
    weights: Arc<DashMap<String, f64>>,
}

impl MemorySelectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`save`](Self::save). A missing file
    /// gives an empty store.
    pub async fn load(path: &Path) -> Result<Self, InfraError> {
        let weights: DashMap<String, f64> = read_json(path).await?.unwrap_or_default();
        tracing::debug!(path = %path.display(), entries = weights.len(), "loaded selector weights");
        Ok(Self {
            weights: Arc::new(weights),
        })
    }

    pub async fn save(&self, path: &Path) -> Result<(), InfraError> {
        write_json(path, &*self.weights).await?;
        tracing::debug!(path = %path.display(), entries = self.weights.len(), "saved selector weights");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// All entries, highest confidence first.
    pub fn entries(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .weights
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

impl SelectorStore for MemorySelectorStore {
    fn get(&self, key: &str) -> Option<f64> {
        self.weights.get(key).map(|r| *r.value())
    }

    fn set(&self, key: &str, weight: f64) {
        if !weight.is_finite() {
            tracing::warn!(key, weight, "ignoring non-finite selector weight");
            return;
        }
        self.weights.insert(key.to_string(), weight.clamp(0.0, 1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use stepforge_core::resolver::ElementResolver;
    use stepforge_types::config::ResolverConfig;
    use stepforge_types::selector::Selector;

    #[test]
    fn set_get_and_clamp() {
        let store = MemorySelectorStore::new();
        assert_eq!(store.get("a::b"), None);
        store.set("a::b", 0.7);
        assert_eq!(store.get("a::b"), Some(0.7));
        store.set("a::b", 3.0);
        assert_eq!(store.get("a::b"), Some(1.0));
        store.set("a::b", f64::NAN);
        assert_eq!(store.get("a::b"), Some(1.0));
    }

    #[test]
    fn clones_share_the_table() {
        let store = MemorySelectorStore::new();
        let view = store.clone();
        store.set("k", 0.25);
        assert_eq!(view.get("k"), Some(0.25));
    }

    #[test]
    fn entries_are_sorted_by_confidence() {
        let store = MemorySelectorStore::new();
        store.set("low", 0.1);
        store.set("high", 0.9);
        store.set("mid", 0.5);
        let keys: Vec<String> = store.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn snapshot_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selectors.json");

        let store = MemorySelectorStore::new();
        store.set("#pay::#pay-v2", 0.8);
        store.save(&path).await.unwrap();

        let reloaded = MemorySelectorStore::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("#pay::#pay-v2"), Some(0.8));

        let fresh = MemorySelectorStore::load(&dir.path().join("none.json")).await.unwrap();
        assert!(fresh.is_empty());
    }

    #[test]
    fn resolver_learning_lands_in_the_store() {
        let store = MemorySelectorStore::new();
        let resolver = ElementResolver::new(Arc::new(store.clone()), &ResolverConfig::default());
        let selector = Selector::new("#old").with_fallbacks(["#new"]);

        resolver.update_selector_strategy(&selector, "#new");
        let hit = store.get(&selector.confidence_key("#new")).unwrap();
        let miss = store.get(&selector.confidence_key("#old")).unwrap();
        assert!(hit > miss);
    }
}
