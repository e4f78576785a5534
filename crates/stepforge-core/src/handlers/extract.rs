//! Read an element's text or attribute into a run variable.
//!
//! The step value selects where the data goes:
//!
//! ```yaml
//! value: total               # variable name, reads text
//! value: { variable: link, attribute: href }
//! ```
//!
//! Without a value the step id names the variable.

use serde_json::{Value, json};
use stepforge_types::error::StepError;
use stepforge_types::step::Step;

use super::{HandlerTools, resolution_json};
use crate::context::ExecutionContext;
use crate::executor::StepHandler;

pub struct ExtractHandler {
    tools: HandlerTools,
}

impl ExtractHandler {
    pub fn new(tools: HandlerTools) -> Self {
        Self { tools }
    }
}

struct ExtractSpec {
    variable: String,
    attribute: Option<String>,
}

fn parse_spec(step: &Step) -> Result<ExtractSpec, StepError> {
    match &step.value {
        None => Ok(ExtractSpec {
            variable: step.id.clone(),
            attribute: None,
        }),
        Some(Value::String(name)) if !name.trim().is_empty() => Ok(ExtractSpec {
            variable: name.trim().to_string(),
            attribute: None,
        }),
        Some(Value::Object(map)) => Ok(ExtractSpec {
            variable: map
                .get("variable")
                .and_then(Value::as_str)
                .map_or_else(|| step.id.clone(), str::to_string),
            attribute: map.get("attribute").and_then(Value::as_str).map(str::to_string),
        }),
        Some(other) => Err(StepError::handler(format!(
            "extract step '{}' has an unusable value: {other}",
            step.id
        ))),
    }
}

impl StepHandler for ExtractHandler {
    async fn execute(&self, step: &Step, ctx: &mut ExecutionContext) -> Result<Value, StepError> {
        let spec = parse_spec(step)?;
        let (_, resolution) = self.tools.locate(step, ctx).await?;
        let element = &resolution.element;

        let extracted = match &spec.attribute {
            Some(attribute) => match element.attributes.get(attribute) {
                Some(v) => Value::String(v.clone()),
                None => Value::Null,
            },
            None => Value::String(element.text.trim().to_string()),
        };

        ctx.set_variable(spec.variable.clone(), extracted.clone());
        Ok(json!({
            "variable": spec.variable,
            "value": extracted,
            "element": resolution_json(&resolution),
        }))
    }
}
