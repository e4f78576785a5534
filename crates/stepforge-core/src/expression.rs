//! Restricted JEXL evaluation for custom step conditions.
//!
//! Expressions see exactly three read-only roots: `variables`, `step` and
//! `workflow`. Values are always passed as context data, never spliced into
//! the expression text, and nothing an expression does can write back into
//! the run.

use regex::RegexBuilder;
use serde_json::{Map, Value, json};

/// Roots an expression may reference.
pub const BINDINGS: [&str; 3] = ["variables", "step", "workflow"];

/// Compiled-size cap for patterns passed to the `matches` transform.
const PATTERN_SIZE_LIMIT: usize = 1 << 16;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression evaluation failed: {0}")]
    EvalFailed(String),

    #[error("invalid context: {0}")]
    InvalidContext(String),

    #[error("expression is empty")]
    Empty,
}

// ---------------------------------------------------------------------------
// ConditionEvaluator
// ---------------------------------------------------------------------------

/// JEXL evaluator with string, boolean and collection transforms registered.
pub struct ConditionEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            .with_transform("lower", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).to_lowercase()))
            })
            .with_transform("upper", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).to_uppercase()))
            })
            .with_transform("trim", |args: &[Value]| Ok(json!(str_arg(args, 0).trim())))
            .with_transform("split", |args: &[Value]| {
                let delimiter = args.get(1).and_then(Value::as_str).unwrap_or(",");
                let parts: Vec<&str> = str_arg(args, 0).split(delimiter).collect();
                Ok(json!(parts))
            })
            .with_transform("not", |args: &[Value]| {
                Ok(json!(!truthy(args.first().unwrap_or(&Value::Null))))
            })
            .with_transform("contains", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).contains(str_arg(args, 1))))
            })
            .with_transform("startsWith", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).starts_with(str_arg(args, 1))))
            })
            .with_transform("endsWith", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).ends_with(str_arg(args, 1))))
            })
            .with_transform("matches", |args: &[Value]| {
                let matched = RegexBuilder::new(str_arg(args, 1))
                    .size_limit(PATTERN_SIZE_LIMIT)
                    .build()
                    .map(|re| re.is_match(str_arg(args, 0)))
                    .unwrap_or(false);
                Ok(json!(matched))
            })
            .with_transform("length", |args: &[Value]| {
                let len = match args.first() {
                    Some(Value::String(s)) => s.chars().count(),
                    Some(Value::Array(a)) => a.len(),
                    Some(Value::Object(o)) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            });

        Self { evaluator }
    }

    /// Evaluate to a boolean using JavaScript-like truthiness.
    pub fn evaluate_bool(&self, expression: &str, context: &Value) -> Result<bool, ExpressionError> {
        self.evaluate_value(expression, context)
            .map(|v| truthy(&v))
    }

    /// Evaluate and return the raw JSON value.
    ///
    /// Only the allowed roots of `context` are exposed to the expression;
    /// any other top-level keys are dropped before evaluation.
    pub fn evaluate_value(&self, expression: &str, context: &Value) -> Result<Value, ExpressionError> {
        if expression.trim().is_empty() {
            return Err(ExpressionError::Empty);
        }
        let Some(object) = context.as_object() else {
            return Err(ExpressionError::InvalidContext(
                "context must be a JSON object".to_string(),
            ));
        };

        let restricted: Map<String, Value> = BINDINGS
            .iter()
            .map(|root| {
                let value = object.get(*root).cloned().unwrap_or_else(|| json!({}));
                (root.to_string(), value)
            })
            .collect();

        self.evaluator
            .eval_in_context(expression, Value::Object(restricted))
            .map_err(|e| ExpressionError::EvalFailed(e.to_string()))
    }
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn str_arg(args: &[Value], index: usize) -> &str {
    args.get(index).and_then(Value::as_str).unwrap_or("")
}

/// JavaScript-like truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
