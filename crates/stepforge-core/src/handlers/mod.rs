//! Built-in step handlers, one per `StepType`.
//!
//! Handlers share a [`HandlerTools`] bundle: the self-healing resolver, the
//! timing controller and the telemetry it reads. Element-targeting handlers
//! locate their target through [`HandlerTools::locate`], which waits with an
//! adaptive budget and honours the step's cancellation token.

pub mod extract;
pub mod input;
pub mod interaction;
pub mod navigation;
pub mod validate;
pub mod wait;

use std::sync::Arc;

use serde_json::{Value, json};
use stepforge_types::error::StepError;
use stepforge_types::selector::Selector;
use stepforge_types::step::{ActionKind, Step, StepType};
use stepforge_types::timing::NetworkConditions;

use crate::context::ExecutionContext;
use crate::executor::StepExecutor;
use crate::page::BoxPage;
use crate::repository::timing::{NetworkTelemetry, NoHistory, TimingHistory};
use crate::resolver::{ElementResolver, Resolution, ResolutionStrategy};
use crate::timing::TimingController;

pub use self::extract::ExtractHandler;
pub use self::input::InputHandler;
pub use self::interaction::InteractionHandler;
pub use self::navigation::NavigationHandler;
pub use self::validate::ValidateHandler;
pub use self::wait::WaitHandler;

// ---------------------------------------------------------------------------
// HandlerTools
// ---------------------------------------------------------------------------

/// Shared services for the built-in handlers. Cheap to clone.
#[derive(Clone)]
pub struct HandlerTools {
    pub resolver: Arc<ElementResolver>,
    pub timing: Arc<TimingController>,
    pub network: Arc<dyn NetworkTelemetry>,
    pub history: Arc<dyn TimingHistory>,
}

impl HandlerTools {
    pub fn new(resolver: Arc<ElementResolver>, timing: Arc<TimingController>) -> Self {
        Self {
            resolver,
            timing,
            network: Arc::new(NetworkConditions::default()),
            history: Arc::new(NoHistory),
        }
    }

    pub fn with_network(mut self, network: Arc<dyn NetworkTelemetry>) -> Self {
        self.network = network;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn TimingHistory>) -> Self {
        self.history = history;
        self
    }

    /// Locate the step's target, waiting up to the adaptive budget (capped
    /// by the step's own timeout).
    pub async fn locate(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
    ) -> Result<(BoxPage, Resolution), StepError> {
        let page = require_page(step, ctx)?;
        let target = require_target(step)?;
        let action = step.action.unwrap_or(ActionKind::Custom);

        let timing_ctx = self
            .timing
            .context_for(step, Some(&page), self.network.as_ref(), self.history.as_ref())
            .await;
        let mut strategy = self.timing.calculate_optimal_wait(action, &timing_ctx);
        if let Some(limit) = step.timeout_ms {
            strategy.timeout_ms = strategy.timeout_ms.min(limit);
        }

        let resolution = self
            .timing
            .wait_for_element(
                &step.id,
                &self.resolver,
                target,
                &page,
                &strategy,
                ctx.step_cancellation(),
            )
            .await?;

        if resolution.strategy != ResolutionStrategy::Primary {
            tracing::info!(
                step_id = step.id.as_str(),
                primary = target.primary.as_str(),
                strategy = %resolution.strategy,
                "target healed"
            );
        }
        Ok((page, resolution))
    }
}

impl std::fmt::Debug for HandlerTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTools")
            .field("timing", &self.timing)
            .field("network", &self.network.current())
            .finish_non_exhaustive()
    }
}

/// Register a built-in handler for every step type.
pub fn register_builtin_handlers(executor: &mut StepExecutor, tools: &HandlerTools) {
    executor.register_handler(StepType::Navigation, NavigationHandler::new(tools.clone()));
    executor.register_handler(StepType::Interaction, InteractionHandler::new(tools.clone()));
    executor.register_handler(StepType::Input, InputHandler::new(tools.clone()));
    executor.register_handler(StepType::Wait, WaitHandler::new(tools.clone()));
    executor.register_handler(StepType::Extract, ExtractHandler::new(tools.clone()));
    executor.register_handler(StepType::Validate, ValidateHandler);
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub(crate) fn require_page(step: &Step, ctx: &ExecutionContext) -> Result<BoxPage, StepError> {
    ctx.page()
        .cloned()
        .ok_or_else(|| StepError::handler(format!("step '{}' needs a page", step.id)))
}

pub(crate) fn require_target(step: &Step) -> Result<&Selector, StepError> {
    step.target
        .as_ref()
        .ok_or_else(|| StepError::handler(format!("step '{}' has no target", step.id)))
}

/// Description of how an element was found, embedded in handler output.
pub(crate) fn resolution_json(resolution: &Resolution) -> Value {
    json!({
        "handle": resolution.element.handle,
        "strategy": resolution.strategy.to_string(),
        "matched_selector": resolution.matched_selector,
        "score": resolution.score,
        "wait_condition": resolution.condition.map(|c| c.to_string()),
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use stepforge_types::config::EngineConfig;

    use crate::testutil::{MockPage, element};

    #[test]
    fn builtins_cover_every_step_type() {
        let mut executor = StepExecutor::new(&EngineConfig::default());
        register_builtin_handlers(&mut executor, &test_support::tools());
        assert_eq!(executor.ensure_handlers(&StepType::ALL), Ok(()));
    }

    #[tokio::test]
    async fn locate_heals_through_fallback() {
        let page = BoxPage::new(MockPage::new().with_element("#new-id", element("btn", "button")));
        let ctx = ExecutionContext::new("wf").with_page(page);
        let step = Step::new("s", StepType::Interaction, ActionKind::Click)
            .with_target(Selector::new("#old-id").with_fallbacks(["#new-id"]))
            .with_timeout(50);

        let (_, resolution) = test_support::tools().locate(&step, &ctx).await.unwrap();
        assert_eq!(resolution.element.handle, "btn");
        assert_eq!(resolution.strategy, ResolutionStrategy::Fallback { index: 0 });
        assert_eq!(resolution_json(&resolution)["strategy"], "fallback[0]");
    }

    #[tokio::test]
    async fn locate_without_page_or_target_fails() {
        let tools = test_support::tools();
        let step = Step::new("s", StepType::Interaction, ActionKind::Click)
            .with_target(Selector::new("#x"));
        let err = tools.locate(&step, &ExecutionContext::new("wf")).await.unwrap_err();
        assert!(err.to_string().contains("needs a page"));

        let ctx = ExecutionContext::new("wf").with_page(BoxPage::new(MockPage::new()));
        let untargeted = Step::new("s", StepType::Interaction, ActionKind::Click);
        let err = tools.locate(&untargeted, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("no target"));
    }

    #[tokio::test]
    async fn locate_times_out_within_step_budget() {
        let ctx = ExecutionContext::new("wf").with_page(BoxPage::new(MockPage::new()));
        let step = Step::new("s", StepType::Interaction, ActionKind::Click)
            .with_target(Selector::new("#missing"))
            .with_timeout(20);
        let err = test_support::tools().locate(&step, &ctx).await.unwrap_err();
        assert!(matches!(err, StepError::ElementNotFound { .. }));
    }

    #[tokio::test]
    async fn locate_accepts_hidden_click_target_under_fallback_condition() {
        let hidden = stepforge_types::element::ElementInfo {
            visible: false,
            ..element("menu", "button")
        };
        let page = BoxPage::new(MockPage::new().with_element("#menu", hidden));
        let ctx = ExecutionContext::new("wf").with_page(page);
        let step = Step::new("open", StepType::Interaction, ActionKind::Click)
            .with_target(Selector::new("#menu"))
            .with_timeout(60);

        let (_, resolution) = test_support::tools().locate(&step, &ctx).await.unwrap();
        assert_eq!(resolution.element.handle, "menu");
        assert_eq!(resolution_json(&resolution)["wait_condition"], "element-stable");
    }
}
