//! Typing and option selection.
//!
//! The step value is rendered through `{{ variables.x }}` templating before
//! it reaches the page. The typed text itself is never echoed into the
//! step result or logs.

use serde_json::{Value, json};
use stepforge_types::error::StepError;
use stepforge_types::step::{ActionKind, Step};

use super::{HandlerTools, resolution_json};
use crate::context::{ExecutionContext, value_to_string};
use crate::executor::StepHandler;

pub struct InputHandler {
    tools: HandlerTools,
}

impl InputHandler {
    pub fn new(tools: HandlerTools) -> Self {
        Self { tools }
    }
}

impl StepHandler for InputHandler {
    async fn execute(&self, step: &Step, ctx: &mut ExecutionContext) -> Result<Value, StepError> {
        let action = step.action.unwrap_or(ActionKind::Custom);
        if !matches!(action, ActionKind::Type | ActionKind::Select) {
            return Err(StepError::handler(format!(
                "input step '{}' does not support action '{action}'",
                step.id
            )));
        }
        let Some(raw) = &step.value else {
            return Err(StepError::handler(format!(
                "input step '{}' has no value",
                step.id
            )));
        };
        let text = ctx.resolve_template(&value_to_string(raw));

        let (page, resolution) = self.tools.locate(step, ctx).await?;
        match action {
            ActionKind::Type => page.type_text(&resolution.element, &text).await?,
            _ => page.select_option(&resolution.element, &text).await?,
        }

        Ok(json!({
            "action": action.as_str(),
            "element": resolution_json(&resolution),
            "length": text.chars().count(),
        }))
    }
}
