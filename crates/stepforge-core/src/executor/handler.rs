//! Step handler port and registry.
//!
//! Same blanket-impl pattern as the page port:
//! 1. `StepHandler` uses a native async fn (RPITIT)
//! 2. `StepHandlerDyn` is the object-safe mirror with a boxed future
//! 3. `BoxStepHandler` wraps `Arc<dyn StepHandlerDyn>` and delegates

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use stepforge_types::error::StepError;
use stepforge_types::step::{Step, StepType};

use crate::context::ExecutionContext;

type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, StepError>> + Send + 'a>>;

/// Executes steps of one `StepType`.
///
/// Handlers may read and write context variables. Long-running handlers
/// should check `ctx.is_cancelled()` at safe points; one that never does
/// runs to completion and has its result discarded.
pub trait StepHandler: Send + Sync {
    fn execute(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
    ) -> impl Future<Output = Result<Value, StepError>> + Send;
}

/// Object-safe version of [`StepHandler`].
pub trait StepHandlerDyn: Send + Sync {
    fn execute_boxed<'a>(&'a self, step: &'a Step, ctx: &'a mut ExecutionContext)
    -> HandlerFuture<'a>;
}

impl<T: StepHandler> StepHandlerDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        step: &'a Step,
        ctx: &'a mut ExecutionContext,
    ) -> HandlerFuture<'a> {
        Box::pin(self.execute(step, ctx))
    }
}

/// Type-erased handler, cheap to clone out of the registry.
#[derive(Clone)]
pub struct BoxStepHandler {
    inner: Arc<dyn StepHandlerDyn>,
}

impl BoxStepHandler {
    pub fn new<T: StepHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Arc::new(handler),
        }
    }

    pub async fn execute(&self, step: &Step, ctx: &mut ExecutionContext) -> Result<Value, StepError> {
        self.inner.execute_boxed(step, ctx).await
    }
}

impl std::fmt::Debug for BoxStepHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxStepHandler").finish_non_exhaustive()
    }
}

/// One handler per `StepType`; the last registration for a type wins.
#[derive(Debug, Default, Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<StepType, BoxStepHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handler this registration replaced, if any.
    pub fn register(&mut self, step_type: StepType, handler: BoxStepHandler) -> Option<BoxStepHandler> {
        let previous = self.handlers.insert(step_type, handler);
        if previous.is_some() {
            tracing::debug!(%step_type, "replacing registered step handler");
        }
        previous
    }

    pub fn get(&self, step_type: StepType) -> Option<&BoxStepHandler> {
        self.handlers.get(&step_type)
    }

    pub fn contains(&self, step_type: StepType) -> bool {
        self.handlers.contains_key(&step_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered types in a stable order.
    pub fn types(&self) -> Vec<StepType> {
        self.handlers.keys().copied().collect()
    }

    /// Types in `required` that have no handler.
    pub fn missing(&self, required: &[StepType]) -> Vec<StepType> {
        required
            .iter()
            .copied()
            .filter(|t| !self.handlers.contains_key(t))
            .collect()
    }
}
