//! Assertions against the page and the run.
//!
//! The step value is an object with any of these checks, all of which must
//! hold:
//!
//! - `expression`: restricted JEXL over `variables`, `step`, `workflow`
//! - `url_contains`: substring of the current URL
//! - `element`: selector that must be present (and visible unless
//!   `visible: false`)
//!
//! A `target` on the step is asserted present as well.

use serde_json::{Value, json};
use stepforge_types::error::StepError;
use stepforge_types::step::Step;

use super::require_page;
use crate::context::ExecutionContext;
use crate::executor::StepHandler;
use crate::expression::ConditionEvaluator;

#[derive(Debug, Default, Clone, Copy)]
pub struct ValidateHandler;

fn failed(step: &Step, reason: impl std::fmt::Display) -> StepError {
    StepError::with_code(
        format!("validation '{}' failed: {reason}", step.id),
        "VALIDATION_FAILED",
    )
}

impl StepHandler for ValidateHandler {
    async fn execute(&self, step: &Step, ctx: &mut ExecutionContext) -> Result<Value, StepError> {
        let checks = match &step.value {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::String(expression)) => {
                let mut map = serde_json::Map::new();
                map.insert("expression".into(), Value::String(expression.clone()));
                map
            }
            None if step.target.is_some() => serde_json::Map::new(),
            _ => {
                return Err(StepError::handler(format!(
                    "validate step '{}' has nothing to check",
                    step.id
                )));
            }
        };
        let mut passed: Vec<&str> = Vec::new();

        if let Some(expression) = checks.get("expression").and_then(Value::as_str) {
            let context = ctx.to_expression_context(step);
            let holds = ConditionEvaluator::new()
                .evaluate_bool(expression, &context)
                .map_err(|e| failed(step, e))?;
            if !holds {
                return Err(failed(step, format!("'{expression}' is false")));
            }
            passed.push("expression");
        }

        if let Some(needle) = checks.get("url_contains").and_then(Value::as_str) {
            let url = require_page(step, ctx)?.current_url().await?;
            if !url.contains(needle) {
                return Err(failed(step, format!("url '{url}' does not contain '{needle}'")));
            }
            passed.push("url_contains");
        }

        let require_visible = checks.get("visible").and_then(Value::as_bool).unwrap_or(true);
        let mut selectors: Vec<String> = Vec::new();
        if let Some(target) = &step.target {
            selectors.push(target.primary.clone());
        }
        if let Some(selector) = checks.get("element").and_then(Value::as_str) {
            selectors.push(selector.to_string());
        }
        if !selectors.is_empty() {
            let page = require_page(step, ctx)?;
            for selector in &selectors {
                match page.query(selector).await? {
                    Some(el) if el.visible || !require_visible => {}
                    Some(_) => return Err(failed(step, format!("'{selector}' is hidden"))),
                    None => return Err(failed(step, format!("'{selector}' is missing"))),
                }
            }
            passed.push("element");
        }

        Ok(json!({ "valid": true, "checks": passed }))
    }
}
