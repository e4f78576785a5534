/// Key -> confidence store used by selector learning.
///
/// Shared by every concurrent run. Writes are last-writer-wins; readers
/// may observe a slightly stale weight.
pub trait SelectorStore: Send + Sync {
    fn get(&self, key: &str) -> Option<f64>;

    fn set(&self, key: &str, weight: f64);
}

/// Store that remembers nothing. Resolution order stays as declared.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSelectorStore;

impl SelectorStore for NoopSelectorStore {
    fn get(&self, _key: &str) -> Option<f64> {
        None
    }

    fn set(&self, _key: &str, _weight: f64) {}
}
