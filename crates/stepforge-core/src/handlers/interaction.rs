//! Click, hover and scroll on a resolved target.

use serde_json::{Value, json};
use stepforge_types::error::StepError;
use stepforge_types::step::{ActionKind, Step};

use super::{HandlerTools, resolution_json};
use crate::context::ExecutionContext;
use crate::executor::StepHandler;

pub struct InteractionHandler {
    tools: HandlerTools,
}

impl InteractionHandler {
    pub fn new(tools: HandlerTools) -> Self {
        Self { tools }
    }
}

impl StepHandler for InteractionHandler {
    async fn execute(&self, step: &Step, ctx: &mut ExecutionContext) -> Result<Value, StepError> {
        let action = step.action.unwrap_or(ActionKind::Custom);
        if !matches!(action, ActionKind::Click | ActionKind::Hover | ActionKind::Scroll) {
            return Err(StepError::handler(format!(
                "interaction step '{}' does not support action '{action}'",
                step.id
            )));
        }

        let (page, resolution) = self.tools.locate(step, ctx).await?;
        let element = &resolution.element;
        match action {
            ActionKind::Click => page.click(element).await?,
            ActionKind::Hover => page.hover(element).await?,
            _ => page.scroll_to(element).await?,
        }

        Ok(json!({
            "action": action.as_str(),
            "element": resolution_json(&resolution),
        }))
    }
}
