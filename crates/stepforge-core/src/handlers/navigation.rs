//! Navigation: load a URL in the run's page.

use serde_json::{Value, json};
use stepforge_types::error::StepError;
use stepforge_types::step::{ActionKind, Step};

use super::{HandlerTools, require_page};
use crate::context::{ExecutionContext, value_to_string};
use crate::executor::StepHandler;

pub struct NavigationHandler {
    tools: HandlerTools,
}

impl NavigationHandler {
    pub fn new(tools: HandlerTools) -> Self {
        Self { tools }
    }
}

impl StepHandler for NavigationHandler {
    async fn execute(&self, step: &Step, ctx: &mut ExecutionContext) -> Result<Value, StepError> {
        if step.action != Some(ActionKind::Navigate) {
            return Err(StepError::handler(format!(
                "navigation step '{}' does not support action '{}'",
                step.id,
                step.action.unwrap_or(ActionKind::Custom)
            )));
        }
        let url = match &step.value {
            Some(value) => ctx.resolve_template(&value_to_string(value)),
            None => String::new(),
        };
        if url.trim().is_empty() {
            return Err(StepError::handler(format!(
                "navigation step '{}' has no url",
                step.id
            )));
        }

        let page = require_page(step, ctx)?;
        page.navigate(&url).await?;
        let landed = page.current_url().await?;

        // Record the load shape so later waits on this page can adapt.
        let complexity = page.dom_complexity().await.unwrap_or_default();
        tracing::debug!(
            step_id = step.id.as_str(),
            url = landed.as_str(),
            dom_nodes = complexity.dom_nodes,
            base_ms = self.tools.timing.config().navigation_base_ms,
            "navigated"
        );

        Ok(json!({ "url": landed, "dom_nodes": complexity.dom_nodes }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepforge_types::step::StepType;

    use crate::handlers::test_support::tools;
    use crate::page::BoxPage;
    use crate::testutil::MockPage;

    #[tokio::test]
    async fn navigates_to_templated_url() {
        let mock = MockPage::new();
        let actions = mock.action_log();
        let mut ctx = ExecutionContext::new("wf").with_page(BoxPage::new(mock));
        ctx.set_variable("host", json!("shop.test"));
        let step = Step::new("open", StepType::Navigation, ActionKind::Navigate)
            .with_value("https://{{ variables.host }}/cart");

        let out = NavigationHandler::new(tools()).execute(&step, &mut ctx).await.unwrap();
        assert_eq!(out["url"], "https://shop.test/cart");
        assert_eq!(
            actions.lock().unwrap().as_slice(),
            ["navigate:https://shop.test/cart"]
        );
    }

    #[tokio::test]
    async fn missing_url_or_wrong_action_is_rejected() {
        let mut ctx = ExecutionContext::new("wf").with_page(BoxPage::new(MockPage::new()));
        let handler = NavigationHandler::new(tools());

        let no_url = Step::new("open", StepType::Navigation, ActionKind::Navigate);
        let err = handler.execute(&no_url, &mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("no url"));

        let wrong = Step::new("open", StepType::Navigation, ActionKind::Click).with_value("/x");
        let err = handler.execute(&wrong, &mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("does not support"));
    }

    #[tokio::test]
    async fn lost_connection_surfaces_as_page_error() {
        let mut ctx =
            ExecutionContext::new("wf").with_page(BoxPage::new(MockPage::new().disconnected()));
        let step = Step::new("open", StepType::Navigation, ActionKind::Navigate).with_value("/x");
        let err = NavigationHandler::new(tools()).execute(&step, &mut ctx).await.unwrap_err();
        assert!(matches!(err, StepError::Page(_)));
        assert!(err.to_string().contains("connection"));
    }
}
