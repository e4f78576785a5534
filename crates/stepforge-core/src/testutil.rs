//! In-memory page used by unit tests across the crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stepforge_types::element::{ElementInfo, Viewport};
use stepforge_types::error::PageError;
use stepforge_types::selector::BoundingBox;
use stepforge_types::timing::PageComplexity;

use crate::page::PageCapability;

pub(crate) fn element(handle: &str, tag: &str) -> ElementInfo {
    ElementInfo {
        handle: handle.to_string(),
        tag: tag.to_string(),
        bounding_box: BoundingBox::new(10.0, 10.0, 100.0, 30.0),
        ..Default::default()
    }
}

pub(crate) fn element_with(handle: &str, tag: &str, attrs: &[(&str, &str)]) -> ElementInfo {
    let mut el = element(handle, tag);
    for (k, v) in attrs {
        el.attributes.insert(k.to_string(), v.to_string());
    }
    el
}

struct Entry {
    selector: String,
    element: ElementInfo,
    /// Number of queries for `selector` that miss before the element appears.
    appears_after: usize,
}

pub(crate) struct MockPage {
    entries: Vec<Entry>,
    screenshots: HashMap<String, Vec<u8>>,
    url: Mutex<String>,
    complexity: PageComplexity,
    query_counts: Mutex<HashMap<String, usize>>,
    queries: Arc<Mutex<Vec<String>>>,
    actions: Arc<Mutex<Vec<String>>>,
    disconnected: bool,
}

impl MockPage {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            screenshots: HashMap::new(),
            url: Mutex::new("https://example.test/".to_string()),
            complexity: PageComplexity::default(),
            query_counts: Mutex::new(HashMap::new()),
            queries: Arc::new(Mutex::new(Vec::new())),
            actions: Arc::new(Mutex::new(Vec::new())),
            disconnected: false,
        }
    }

    pub(crate) fn with_element(mut self, selector: &str, element: ElementInfo) -> Self {
        self.entries.push(Entry {
            selector: selector.to_string(),
            element,
            appears_after: 0,
        });
        self
    }

    /// Element that only appears after `misses` queries for `selector`.
    pub(crate) fn with_delayed_element(
        mut self,
        selector: &str,
        element: ElementInfo,
        misses: usize,
    ) -> Self {
        self.entries.push(Entry {
            selector: selector.to_string(),
            element,
            appears_after: misses,
        });
        self
    }

    pub(crate) fn with_screenshot(mut self, handle: &str, bytes: Vec<u8>) -> Self {
        self.screenshots.insert(handle.to_string(), bytes);
        self
    }

    pub(crate) fn with_url(self, url: &str) -> Self {
        *self.url.lock().unwrap() = url.to_string();
        self
    }

    pub(crate) fn with_complexity(mut self, complexity: PageComplexity) -> Self {
        self.complexity = complexity;
        self
    }

    pub(crate) fn disconnected(mut self) -> Self {
        self.disconnected = true;
        self
    }

    pub(crate) fn query_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.queries)
    }

    pub(crate) fn action_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.actions)
    }

    fn check_connected(&self) -> Result<(), PageError> {
        if self.disconnected {
            Err(PageError::ConnectionLost("mock page disconnected".into()))
        } else {
            Ok(())
        }
    }
}

impl PageCapability for MockPage {
    async fn query(&self, selector: &str) -> Result<Option<ElementInfo>, PageError> {
        self.check_connected()?;
        self.queries.lock().unwrap().push(selector.to_string());
        let seen = {
            let mut counts = self.query_counts.lock().unwrap();
            let count = counts.entry(selector.to_string()).or_insert(0);
            let seen = *count;
            *count += 1;
            seen
        };
        Ok(self
            .entries
            .iter()
            .find(|e| e.selector == selector && seen >= e.appears_after)
            .map(|e| e.element.clone()))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementInfo>, PageError> {
        self.check_connected()?;
        self.queries.lock().unwrap().push(format!("all:{selector}"));
        let mut out: Vec<ElementInfo> = Vec::new();
        for entry in &self.entries {
            if entry.appears_after > 0 {
                continue;
            }
            if (selector == "*" || entry.selector == selector)
                && !out.iter().any(|e| e.handle == entry.element.handle)
            {
                out.push(entry.element.clone());
            }
        }
        Ok(out)
    }

    async fn click(&self, element: &ElementInfo) -> Result<(), PageError> {
        self.check_connected()?;
        self.actions
            .lock()
            .unwrap()
            .push(format!("click:{}", element.handle));
        Ok(())
    }

    async fn type_text(&self, element: &ElementInfo, text: &str) -> Result<(), PageError> {
        self.check_connected()?;
        self.actions
            .lock()
            .unwrap()
            .push(format!("type:{}:{text}", element.handle));
        Ok(())
    }

    async fn screenshot(&self, element: Option<&ElementInfo>) -> Result<Vec<u8>, PageError> {
        self.check_connected()?;
        Ok(element
            .and_then(|e| self.screenshots.get(&e.handle).cloned())
            .unwrap_or_default())
    }

    async fn current_url(&self) -> Result<String, PageError> {
        self.check_connected()?;
        Ok(self.url.lock().unwrap().clone())
    }

    async fn viewport(&self) -> Result<Viewport, PageError> {
        Ok(Viewport::default())
    }

    async fn dom_complexity(&self) -> Result<PageComplexity, PageError> {
        self.check_connected()?;
        Ok(self.complexity)
    }

    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        self.check_connected()?;
        *self.url.lock().unwrap() = url.to_string();
        self.actions.lock().unwrap().push(format!("navigate:{url}"));
        Ok(())
    }

    async fn hover(&self, element: &ElementInfo) -> Result<(), PageError> {
        self.check_connected()?;
        self.actions
            .lock()
            .unwrap()
            .push(format!("hover:{}", element.handle));
        Ok(())
    }

    async fn scroll_to(&self, element: &ElementInfo) -> Result<(), PageError> {
        self.check_connected()?;
        self.actions
            .lock()
            .unwrap()
            .push(format!("scroll:{}", element.handle));
        Ok(())
    }

    async fn select_option(&self, element: &ElementInfo, value: &str) -> Result<(), PageError> {
        self.check_connected()?;
        self.actions
            .lock()
            .unwrap()
            .push(format!("select:{}:{value}", element.handle));
        Ok(())
    }
}
