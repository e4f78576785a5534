//! Page capability port and its type-erased wrapper.
//!
//! The engine never drives a browser itself. It consumes a narrow set of
//! page primitives through [`PageCapability`]; concrete drivers live
//! outside this crate.
//!
//! Same blanket-impl pattern used for every RPITIT port in this crate:
//! 1. `PageCapability` uses native async fns (RPITIT)
//! 2. `PageCapabilityDyn` is the object-safe mirror with boxed futures
//! 3. `BoxPage` wraps `Arc<dyn PageCapabilityDyn>` and delegates

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use stepforge_types::element::{ElementInfo, Viewport};
use stepforge_types::error::PageError;
use stepforge_types::timing::PageComplexity;

type PageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PageError>> + Send + 'a>>;

/// Primitive page operations consumed by the engine.
///
/// `query` returns `Ok(None)` when nothing matches; `Err` is reserved for
/// failures of the page itself (lost connection, invalid selector).
pub trait PageCapability: Send + Sync {
    fn query(
        &self,
        selector: &str,
    ) -> impl Future<Output = Result<Option<ElementInfo>, PageError>> + Send;

    fn query_all(
        &self,
        selector: &str,
    ) -> impl Future<Output = Result<Vec<ElementInfo>, PageError>> + Send;

    fn click(&self, element: &ElementInfo) -> impl Future<Output = Result<(), PageError>> + Send;

    fn type_text(
        &self,
        element: &ElementInfo,
        text: &str,
    ) -> impl Future<Output = Result<(), PageError>> + Send;

    /// Screenshot of one element, or of the viewport when `element` is `None`.
    fn screenshot(
        &self,
        element: Option<&ElementInfo>,
    ) -> impl Future<Output = Result<Vec<u8>, PageError>> + Send;

    fn current_url(&self) -> impl Future<Output = Result<String, PageError>> + Send;

    fn viewport(&self) -> impl Future<Output = Result<Viewport, PageError>> + Send;

    fn dom_complexity(&self) -> impl Future<Output = Result<PageComplexity, PageError>> + Send;

    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), PageError>> + Send {
        let _ = url;
        async { Err(PageError::NotSupported("navigate".into())) }
    }

    fn hover(&self, element: &ElementInfo) -> impl Future<Output = Result<(), PageError>> + Send {
        let _ = element;
        async { Err(PageError::NotSupported("hover".into())) }
    }

    fn scroll_to(
        &self,
        element: &ElementInfo,
    ) -> impl Future<Output = Result<(), PageError>> + Send {
        let _ = element;
        async { Err(PageError::NotSupported("scroll".into())) }
    }

    fn select_option(
        &self,
        element: &ElementInfo,
        value: &str,
    ) -> impl Future<Output = Result<(), PageError>> + Send {
        let _ = (element, value);
        async { Err(PageError::NotSupported("select".into())) }
    }
}

/// Object-safe version of [`PageCapability`] with boxed futures.
pub trait PageCapabilityDyn: Send + Sync {
    fn query_boxed<'a>(&'a self, selector: &'a str) -> PageFuture<'a, Option<ElementInfo>>;
    fn query_all_boxed<'a>(&'a self, selector: &'a str) -> PageFuture<'a, Vec<ElementInfo>>;
    fn click_boxed<'a>(&'a self, element: &'a ElementInfo) -> PageFuture<'a, ()>;
    fn type_text_boxed<'a>(&'a self, element: &'a ElementInfo, text: &'a str)
    -> PageFuture<'a, ()>;
    fn screenshot_boxed<'a>(&'a self, element: Option<&'a ElementInfo>) -> PageFuture<'a, Vec<u8>>;
    fn current_url_boxed(&self) -> PageFuture<'_, String>;
    fn viewport_boxed(&self) -> PageFuture<'_, Viewport>;
    fn dom_complexity_boxed(&self) -> PageFuture<'_, PageComplexity>;
    fn navigate_boxed<'a>(&'a self, url: &'a str) -> PageFuture<'a, ()>;
    fn hover_boxed<'a>(&'a self, element: &'a ElementInfo) -> PageFuture<'a, ()>;
    fn scroll_to_boxed<'a>(&'a self, element: &'a ElementInfo) -> PageFuture<'a, ()>;
    fn select_option_boxed<'a>(
        &'a self,
        element: &'a ElementInfo,
        value: &'a str,
    ) -> PageFuture<'a, ()>;
}

impl<T: PageCapability> PageCapabilityDyn for T {
    fn query_boxed<'a>(&'a self, selector: &'a str) -> PageFuture<'a, Option<ElementInfo>> {
        Box::pin(self.query(selector))
    }

    fn query_all_boxed<'a>(&'a self, selector: &'a str) -> PageFuture<'a, Vec<ElementInfo>> {
        Box::pin(self.query_all(selector))
    }

    fn click_boxed<'a>(&'a self, element: &'a ElementInfo) -> PageFuture<'a, ()> {
        Box::pin(self.click(element))
    }

    fn type_text_boxed<'a>(
        &'a self,
        element: &'a ElementInfo,
        text: &'a str,
    ) -> PageFuture<'a, ()> {
        Box::pin(self.type_text(element, text))
    }

    fn screenshot_boxed<'a>(&'a self, element: Option<&'a ElementInfo>) -> PageFuture<'a, Vec<u8>> {
        Box::pin(self.screenshot(element))
    }

    fn current_url_boxed(&self) -> PageFuture<'_, String> {
        Box::pin(self.current_url())
    }

    fn viewport_boxed(&self) -> PageFuture<'_, Viewport> {
        Box::pin(self.viewport())
    }

    fn dom_complexity_boxed(&self) -> PageFuture<'_, PageComplexity> {
        Box::pin(self.dom_complexity())
    }

    fn navigate_boxed<'a>(&'a self, url: &'a str) -> PageFuture<'a, ()> {
        Box::pin(self.navigate(url))
    }

    fn hover_boxed<'a>(&'a self, element: &'a ElementInfo) -> PageFuture<'a, ()> {
        Box::pin(self.hover(element))
    }

    fn scroll_to_boxed<'a>(&'a self, element: &'a ElementInfo) -> PageFuture<'a, ()> {
        Box::pin(self.scroll_to(element))
    }

    fn select_option_boxed<'a>(
        &'a self,
        element: &'a ElementInfo,
        value: &'a str,
    ) -> PageFuture<'a, ()> {
        Box::pin(self.select_option(element, value))
    }
}

/// Type-erased, cheaply clonable page handle.
///
/// Handlers, the executor's condition evaluator and the recovery framework
/// all hold clones of the same page.
#[derive(Clone)]
pub struct BoxPage {
    inner: Arc<dyn PageCapabilityDyn>,
}

impl BoxPage {
    pub fn new<T: PageCapability + 'static>(page: T) -> Self {
        Self {
            inner: Arc::new(page),
        }
    }

    pub async fn query(&self, selector: &str) -> Result<Option<ElementInfo>, PageError> {
        self.inner.query_boxed(selector).await
    }

    pub async fn query_all(&self, selector: &str) -> Result<Vec<ElementInfo>, PageError> {
        self.inner.query_all_boxed(selector).await
    }

    pub async fn click(&self, element: &ElementInfo) -> Result<(), PageError> {
        self.inner.click_boxed(element).await
    }

    pub async fn type_text(&self, element: &ElementInfo, text: &str) -> Result<(), PageError> {
        self.inner.type_text_boxed(element, text).await
    }

    pub async fn screenshot(&self, element: Option<&ElementInfo>) -> Result<Vec<u8>, PageError> {
        self.inner.screenshot_boxed(element).await
    }

    pub async fn current_url(&self) -> Result<String, PageError> {
        self.inner.current_url_boxed().await
    }

    pub async fn viewport(&self) -> Result<Viewport, PageError> {
        self.inner.viewport_boxed().await
    }

    pub async fn dom_complexity(&self) -> Result<PageComplexity, PageError> {
        self.inner.dom_complexity_boxed().await
    }

    pub async fn navigate(&self, url: &str) -> Result<(), PageError> {
        self.inner.navigate_boxed(url).await
    }

    pub async fn hover(&self, element: &ElementInfo) -> Result<(), PageError> {
        self.inner.hover_boxed(element).await
    }

    pub async fn scroll_to(&self, element: &ElementInfo) -> Result<(), PageError> {
        self.inner.scroll_to_boxed(element).await
    }

    pub async fn select_option(&self, element: &ElementInfo, value: &str) -> Result<(), PageError> {
        self.inner.select_option_boxed(element, value).await
    }
}

impl std::fmt::Debug for BoxPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxPage").finish_non_exhaustive()
    }
}
