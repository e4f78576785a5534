//! A page capability backed by a recorded DOM snapshot.
//!
//! Used for dry runs: workflows resolve, wait and act against a JSON
//! description of a page instead of a live browser. Actions are recorded,
//! never performed.
//!
//! ```json
//! {
//!   "url": "https://shop.test/cart",
//!   "complexity": { "dom_nodes": 900 },
//!   "network": [{ "latency_ms": 80, "throughput_kbps": 4000 }],
//!   "elements": [
//!     {
//!       "selectors": ["#pay", "button.pay"],
//!       "element": { "handle": "pay", "tag": "button", "text": "Pay" },
//!       "screenshot": "<base64>"
//!     }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use stepforge_core::page::PageCapability;
use stepforge_types::element::{ElementInfo, Viewport};
use stepforge_types::error::PageError;
use stepforge_types::timing::{NetworkConditions, PageComplexity};

use crate::error::InfraError;

// ---------------------------------------------------------------------------
// Snapshot file format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub complexity: PageComplexity,
    /// Network observations captured alongside the page.
    #[serde(default)]
    pub network: Vec<NetworkConditions>,
    #[serde(default)]
    pub elements: Vec<SnapshotElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotElement {
    /// Selectors that match this element, matched verbatim.
    #[serde(default)]
    pub selectors: Vec<String>,
    pub element: ElementInfo,
    /// Base64 image of the element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl PageSnapshot {
    pub fn from_json(json: &str) -> Result<Self, InfraError> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn load(path: &Path) -> Result<Self, InfraError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content)
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SnapshotPage {
    elements: Vec<SnapshotElement>,
    screenshots: HashMap<String, Vec<u8>>,
    viewport: Viewport,
    complexity: PageComplexity,
    url: Mutex<String>,
    actions: Arc<Mutex<Vec<String>>>,
}

impl SnapshotPage {
    /// Build a page from a snapshot, rejecting duplicate handles and
    /// undecodable screenshots.
    pub fn new(snapshot: PageSnapshot) -> Result<Self, InfraError> {
        let mut handles = HashSet::new();
        let mut screenshots = HashMap::new();
        for entry in &snapshot.elements {
            let handle = &entry.element.handle;
            if handle.is_empty() {
                return Err(InfraError::InvalidSnapshot("element without a handle".into()));
            }
            if !handles.insert(handle.clone()) {
                return Err(InfraError::InvalidSnapshot(format!(
                    "duplicate element handle '{handle}'"
                )));
            }
            if let Some(encoded) = &entry.screenshot {
                let bytes = BASE64.decode(encoded).map_err(|e| {
                    InfraError::InvalidSnapshot(format!("screenshot of '{handle}': {e}"))
                })?;
                screenshots.insert(handle.clone(), bytes);
            }
        }

        Ok(Self {
            elements: snapshot.elements,
            screenshots,
            viewport: snapshot.viewport,
            complexity: snapshot.complexity,
            url: Mutex::new(snapshot.url),
            actions: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub async fn load(path: &Path) -> Result<Self, InfraError> {
        Self::new(PageSnapshot::load(path).await?)
    }

    /// Every action performed so far, in order, as `kind:handle[:arg]`.
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Shared handle on the action log that outlives the page, which is
    /// usually moved into a `BoxPage`.
    pub fn action_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.actions)
    }

    fn record(&self, action: String) {
        tracing::debug!(%action, "snapshot page action");
        self.actions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(action);
    }

    fn matches(entry: &SnapshotElement, selector: &str) -> bool {
        selector == "*"
            || entry.selectors.iter().any(|s| s == selector)
            || entry.element.tag.eq_ignore_ascii_case(selector)
            || selector
                .strip_prefix('#')
                .is_some_and(|id| entry.element.id() == Some(id))
    }

    fn interactable(&self, element: &ElementInfo) -> Result<(), PageError> {
        let known = self
            .elements
            .iter()
            .find(|e| e.element.handle == element.handle)
            .ok_or_else(|| PageError::ElementNotFound(element.handle.clone()))?;
        if !known.element.visible {
            return Err(PageError::NotInteractable {
                handle: element.handle.clone(),
                reason: "element is hidden".into(),
            });
        }
        Ok(())
    }
}

impl PageCapability for SnapshotPage {
    async fn query(&self, selector: &str) -> Result<Option<ElementInfo>, PageError> {
        Ok(self
            .elements
            .iter()
            .find(|e| Self::matches(e, selector))
            .map(|e| e.element.clone()))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementInfo>, PageError> {
        Ok(self
            .elements
            .iter()
            .filter(|e| Self::matches(e, selector))
            .map(|e| e.element.clone())
            .collect())
    }

    async fn click(&self, element: &ElementInfo) -> Result<(), PageError> {
        self.interactable(element)?;
        self.record(format!("click:{}", element.handle));
        Ok(())
    }

    async fn type_text(&self, element: &ElementInfo, text: &str) -> Result<(), PageError> {
        self.interactable(element)?;
        self.record(format!("type:{}:{}", element.handle, text.chars().count()));
        Ok(())
    }

    async fn screenshot(&self, element: Option<&ElementInfo>) -> Result<Vec<u8>, PageError> {
        Ok(element
            .and_then(|e| self.screenshots.get(&e.handle).cloned())
            .unwrap_or_default())
    }

    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self.url.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    async fn viewport(&self) -> Result<Viewport, PageError> {
        Ok(self.viewport)
    }

    async fn dom_complexity(&self) -> Result<PageComplexity, PageError> {
        Ok(self.complexity)
    }

    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        if url.trim().is_empty() {
            return Err(PageError::Navigation("empty url".into()));
        }
        *self.url.lock().unwrap_or_else(|p| p.into_inner()) = url.to_string();
        self.record(format!("navigate:{url}"));
        Ok(())
    }

    async fn hover(&self, element: &ElementInfo) -> Result<(), PageError> {
        self.interactable(element)?;
        self.record(format!("hover:{}", element.handle));
        Ok(())
    }

    async fn scroll_to(&self, element: &ElementInfo) -> Result<(), PageError> {
        self.record(format!("scroll:{}", element.handle));
        Ok(())
    }

    async fn select_option(&self, element: &ElementInfo, value: &str) -> Result<(), PageError> {
        self.interactable(element)?;
        self.record(format!("select:{}:{value}", element.handle));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CART: &str = r##"{
        "url": "https://shop.test/cart",
        "complexity": { "dom_nodes": 900, "scripts": 4, "stylesheets": 2, "images": 10 },
        "network": [{ "latency_ms": 80.0, "throughput_kbps": 4000.0 }],
        "elements": [
            {
                "selectors": ["#pay", "button.pay"],
                "element": { "handle": "pay", "tag": "button", "text": "Pay",
                             "attributes": { "id": "pay" } },
                "screenshot": "AAEC"
            },
            {
                "selectors": [".debug"],
                "element": { "handle": "dbg", "tag": "div", "visible": false }
            }
        ]
    }"##;

    fn page() -> SnapshotPage {
        SnapshotPage::new(PageSnapshot::from_json(CART).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn query_matches_listed_selectors_ids_and_tags() {
        let page = page();
        assert_eq!(page.query("button.pay").await.unwrap().unwrap().handle, "pay");
        assert_eq!(page.query("BUTTON").await.unwrap().unwrap().handle, "pay");
        assert!(page.query("#nope").await.unwrap().is_none());
        assert_eq!(page.query_all("*").await.unwrap().len(), 2);
        assert_eq!(page.dom_complexity().await.unwrap().dom_nodes, 900);
    }

    #[tokio::test]
    async fn actions_are_recorded_not_performed() {
        let page = page();
        let pay = page.query("#pay").await.unwrap().unwrap();
        page.click(&pay).await.unwrap();
        page.type_text(&pay, "secret").await.unwrap();
        page.navigate("https://shop.test/done").await.unwrap();

        assert_eq!(
            page.actions(),
            ["click:pay", "type:pay:6", "navigate:https://shop.test/done"]
        );
        assert_eq!(page.current_url().await.unwrap(), "https://shop.test/done");
    }

    #[tokio::test]
    async fn action_log_outlives_the_page() {
        let page = page();
        let log = page.action_log();
        let boxed = stepforge_core::page::BoxPage::new(page);
        boxed.navigate("https://shop.test/next").await.unwrap();
        drop(boxed);
        assert_eq!(*log.lock().unwrap(), ["navigate:https://shop.test/next"]);
    }

    #[tokio::test]
    async fn hidden_elements_are_not_interactable() {
        let page = page();
        let debug = page.query(".debug").await.unwrap().unwrap();
        let err = page.click(&debug).await.unwrap_err();
        assert_eq!(err.code(), "ELEMENT_NOT_INTERACTABLE");
    }

    #[tokio::test]
    async fn screenshots_are_decoded() {
        let page = page();
        let pay = page.query("#pay").await.unwrap().unwrap();
        assert_eq!(page.screenshot(Some(&pay)).await.unwrap(), vec![0, 1, 2]);
        assert!(page.screenshot(None).await.unwrap().is_empty());
    }

    #[test]
    fn duplicate_handles_and_bad_base64_are_rejected() {
        let dup = r#"{"elements":[
            {"element":{"handle":"a","tag":"div"}},
            {"element":{"handle":"a","tag":"span"}}]}"#;
        let err = SnapshotPage::new(PageSnapshot::from_json(dup).unwrap()).unwrap_err();
        assert!(err.to_string().contains("duplicate element handle"));

        let bad = r#"{"elements":[{"element":{"handle":"a","tag":"div"},"screenshot":"@@"}]}"#;
        let err = SnapshotPage::new(PageSnapshot::from_json(bad).unwrap()).unwrap_err();
        assert!(matches!(err, InfraError::InvalidSnapshot(_)));
    }

    #[tokio::test]
    async fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cart.json");
        tokio::fs::write(&path, CART).await.unwrap();
        let page = SnapshotPage::load(&path).await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "https://shop.test/cart");
    }
}
