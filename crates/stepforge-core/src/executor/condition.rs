//! Step precondition evaluation.
//!
//! Conditions run before dispatch. Any condition that is false, or that
//! cannot be evaluated, blocks the step with a human-readable reason.

use serde_json::Value;
use stepforge_types::step::{Condition, ConditionOperator, ElementState, Step, UrlMatch};

use crate::context::ExecutionContext;
use crate::expression::ConditionEvaluator;

/// Evaluate every condition of `step` in order, stopping at the first
/// failure. `Err` carries the reason.
pub async fn check_conditions(step: &Step, ctx: &ExecutionContext) -> Result<(), String> {
    for condition in &step.conditions {
        check(condition, step, ctx).await?;
    }
    Ok(())
}

async fn check(condition: &Condition, step: &Step, ctx: &ExecutionContext) -> Result<(), String> {
    match condition {
        Condition::Variable {
            name,
            operator,
            value,
        } => {
            let actual = ctx.get_variable(name);
            if compare(actual, *operator, value) {
                Ok(())
            } else {
                Err(format!(
                    "variable '{name}' ({}) failed {operator:?} {value}",
                    actual.map_or_else(|| "unset".to_string(), Value::to_string)
                ))
            }
        }

        Condition::Element { selector, state } => {
            let page = ctx
                .page()
                .ok_or_else(|| format!("element condition on '{selector}' needs a page"))?;
            let found = page
                .query(selector)
                .await
                .map_err(|e| format!("element condition on '{selector}': {e}"))?;
            let holds = match state {
                ElementState::Exists => found.is_some(),
                ElementState::Absent => found.is_none(),
                ElementState::Visible => found.as_ref().is_some_and(|e| e.visible),
                ElementState::Hidden => found.as_ref().is_none_or(|e| !e.visible),
            };
            if holds {
                Ok(())
            } else {
                let state = match state {
                    ElementState::Exists => "present",
                    ElementState::Absent => "absent",
                    ElementState::Visible => "visible",
                    ElementState::Hidden => "hidden",
                };
                Err(format!("element '{selector}' is not {state}"))
            }
        }

        Condition::Url { pattern, mode } => {
            let page = ctx
                .page()
                .ok_or_else(|| format!("url condition '{pattern}' needs a page"))?;
            let url = page
                .current_url()
                .await
                .map_err(|e| format!("url condition '{pattern}': {e}"))?;
            let holds = match mode {
                UrlMatch::Contains => url.contains(pattern.as_str()),
                UrlMatch::Equals => url == *pattern,
                UrlMatch::Regex => regex::Regex::new(pattern)
                    .map_err(|e| format!("invalid url pattern '{pattern}': {e}"))?
                    .is_match(&url),
            };
            if holds {
                Ok(())
            } else {
                Err(format!("url '{url}' does not match '{pattern}'"))
            }
        }

        Condition::Custom { expression } => {
            // Evaluated synchronously; the evaluator never lives across an await.
            let context = ctx.to_expression_context(step);
            match ConditionEvaluator::new().evaluate_bool(expression, &context) {
                Ok(true) => Ok(()),
                Ok(false) => Err(format!("condition '{expression}' is false")),
                Err(e) => Err(format!("condition '{expression}': {e}")),
            }
        }
    }
}

/// Compare a context variable against a literal.
pub fn compare(actual: Option<&Value>, operator: ConditionOperator, expected: &Value) -> bool {
    match operator {
        ConditionOperator::Exists => actual.is_some_and(|v| !v.is_null()),
        ConditionOperator::Equals => actual.is_some_and(|v| loosely_equal(v, expected)),
        ConditionOperator::NotEquals => !actual.is_some_and(|v| loosely_equal(v, expected)),
        ConditionOperator::Contains => match actual {
            Some(Value::String(s)) => expected.as_str().is_some_and(|needle| s.contains(needle)),
            Some(Value::Array(items)) => items.iter().any(|item| loosely_equal(item, expected)),
            Some(Value::Object(map)) => expected.as_str().is_some_and(|key| map.contains_key(key)),
            _ => false,
        },
        ConditionOperator::GreaterThan => {
            ordering(actual, expected).is_some_and(|o| o == std::cmp::Ordering::Greater)
        }
        ConditionOperator::LessThan => {
            ordering(actual, expected).is_some_and(|o| o == std::cmp::Ordering::Less)
        }
    }
}

/// Numbers compare by value regardless of integer/float representation.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn ordering(actual: Option<&Value>, expected: &Value) -> Option<std::cmp::Ordering> {
    let actual = actual?;
    match (actual.as_f64(), expected.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (actual.as_str(), expected.as_str()) {
            (Some(x), Some(y)) => Some(x.cmp(y)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepforge_types::step::{ActionKind, StepType};

    use crate::page::BoxPage;
    use crate::testutil::{MockPage, element};

    fn step_with(conditions: Vec<Condition>) -> Step {
        let mut step = Step::new("s1", StepType::Interaction, ActionKind::Click);
        step.conditions = conditions;
        step
    }

    // -------------------------------------------------------------------
    // Variable comparisons
    // -------------------------------------------------------------------

    #[test]
    fn equality_treats_int_and_float_alike() {
        assert!(compare(Some(&json!(3)), ConditionOperator::Equals, &json!(3.0)));
        assert!(compare(Some(&json!("a")), ConditionOperator::NotEquals, &json!("b")));
        assert!(compare(None, ConditionOperator::NotEquals, &json!("b")));
        assert!(!compare(None, ConditionOperator::Equals, &Value::Null));
    }

    #[test]
    fn contains_handles_strings_arrays_and_objects() {
        assert!(compare(Some(&json!("hello world")), ConditionOperator::Contains, &json!("lo w")));
        assert!(compare(Some(&json!([1, 2, 3])), ConditionOperator::Contains, &json!(2)));
        assert!(compare(Some(&json!({ "k": 1 })), ConditionOperator::Contains, &json!("k")));
        assert!(!compare(Some(&json!(42)), ConditionOperator::Contains, &json!("4")));
    }

    #[test]
    fn ordering_on_numbers_and_strings() {
        assert!(compare(Some(&json!(5)), ConditionOperator::GreaterThan, &json!(3)));
        assert!(compare(Some(&json!(1.5)), ConditionOperator::LessThan, &json!(2)));
        assert!(compare(Some(&json!("b")), ConditionOperator::GreaterThan, &json!("a")));
        assert!(!compare(Some(&json!("5")), ConditionOperator::GreaterThan, &json!(3)));
        assert!(!compare(None, ConditionOperator::LessThan, &json!(3)));
    }

    #[test]
    fn exists_ignores_null() {
        assert!(compare(Some(&json!(false)), ConditionOperator::Exists, &Value::Null));
        assert!(!compare(Some(&Value::Null), ConditionOperator::Exists, &Value::Null));
        assert!(!compare(None, ConditionOperator::Exists, &Value::Null));
    }

    // -------------------------------------------------------------------
    // check_conditions
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn all_kinds_pass_together() {
        let page = BoxPage::new(
            MockPage::new()
                .with_url("https://shop.test/cart")
                .with_element("#pay", element("p", "button")),
        );
        let mut ctx = ExecutionContext::new("checkout").with_page(page);
        ctx.set_variable("items", json!(2.0));

        let step = step_with(vec![
            Condition::Variable {
                name: "items".into(),
                operator: ConditionOperator::GreaterThan,
                value: json!(0),
            },
            Condition::Url {
                pattern: r"/cart$".into(),
                mode: UrlMatch::Regex,
            },
            Condition::Element {
                selector: "#pay".into(),
                state: ElementState::Visible,
            },
            Condition::Element {
                selector: "#spinner".into(),
                state: ElementState::Absent,
            },
            Condition::Custom {
                expression: "variables.items > 1 && step.id == 's1'".into(),
            },
        ]);

        check_conditions(&step, &ctx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_failure_is_reported() {
        let ctx = ExecutionContext::new("wf");
        let step = step_with(vec![
            Condition::Variable {
                name: "logged_in".into(),
                operator: ConditionOperator::Exists,
                value: Value::Null,
            },
            Condition::Custom {
                expression: "false".into(),
            },
        ]);

        let reason = check_conditions(&step, &ctx)
            .await
            .unwrap_err();
        assert!(reason.contains("logged_in"), "{reason}");
    }

    #[tokio::test]
    async fn page_conditions_without_page_fail() {
        let ctx = ExecutionContext::new("wf");
        let step = step_with(vec![Condition::Url {
            pattern: "/home".into(),
            mode: UrlMatch::Contains,
        }]);
        let reason = check_conditions(&step, &ctx)
            .await
            .unwrap_err();
        assert!(reason.contains("needs a page"));
    }

    #[tokio::test]
    async fn broken_expression_blocks_the_step() {
        let ctx = ExecutionContext::new("wf");
        let step = step_with(vec![Condition::Custom {
            expression: "variables.x ==".into(),
        }]);
        assert!(
            check_conditions(&step, &ctx)
                .await
                .is_err()
        );
    }
}
