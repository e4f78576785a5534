//! Explicit waits: a fixed delay, or until the target appears.

use std::time::{Duration, Instant};

use serde_json::{Value, json};
use stepforge_types::error::StepError;
use stepforge_types::step::Step;

use super::{HandlerTools, resolution_json};
use crate::context::ExecutionContext;
use crate::executor::StepHandler;

pub struct WaitHandler {
    tools: HandlerTools,
}

impl WaitHandler {
    pub fn new(tools: HandlerTools) -> Self {
        Self { tools }
    }
}

impl StepHandler for WaitHandler {
    async fn execute(&self, step: &Step, ctx: &mut ExecutionContext) -> Result<Value, StepError> {
        let started = Instant::now();

        if step.target.is_some() {
            let (_, resolution) = self.tools.locate(step, ctx).await?;
            return Ok(json!({
                "element": resolution_json(&resolution),
                "waited_ms": started.elapsed().as_millis() as u64,
            }));
        }

        let delay_ms = step
            .value
            .as_ref()
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
            .ok_or_else(|| {
                StepError::handler(format!(
                    "wait step '{}' needs a target or a delay in milliseconds",
                    step.id
                ))
            })?;

        let cancel = ctx.step_cancellation().clone();
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(StepError::Cancelled { step_id: step.id.clone() });
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        }
        Ok(json!({ "waited_ms": started.elapsed().as_millis() as u64 }))
    }
}
