//! Declarative step definitions.
//!
//! A `Step` is one unit of automation work. Steps are authored externally
//! (YAML/JSON) and are immutable for the duration of a run. Structural
//! validity (`id`, `type`, `action` present) is checked by the executor, so
//! those fields deserialize leniently and a malformed step still reaches
//! validation instead of failing inside the parser.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::selector::Selector;

// ---------------------------------------------------------------------------
// StepType / ActionKind
// ---------------------------------------------------------------------------

/// Closed set of step categories. Each variant has exactly one registered
/// handler at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Navigation,
    Interaction,
    Input,
    Wait,
    Extract,
    Validate,
}

impl StepType {
    pub const ALL: [StepType; 6] = [
        StepType::Navigation,
        StepType::Interaction,
        StepType::Input,
        StepType::Wait,
        StepType::Extract,
        StepType::Validate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Navigation => "navigation",
            StepType::Interaction => "interaction",
            StepType::Input => "input",
            StepType::Wait => "wait",
            StepType::Extract => "extract",
            StepType::Validate => "validate",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The concrete action a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Hover,
    Scroll,
    Type,
    Select,
    Wait,
    Extract,
    Validate,
    Screenshot,
    #[serde(other)]
    Custom,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Hover => "hover",
            ActionKind::Scroll => "scroll",
            ActionKind::Type => "type",
            ActionKind::Select => "select",
            ActionKind::Wait => "wait",
            ActionKind::Extract => "extract",
            ActionKind::Validate => "validate",
            ActionKind::Screenshot => "screenshot",
            ActionKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Error policy
// ---------------------------------------------------------------------------

/// Per-step override of the executor's failure decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    /// Finalize as completed-with-warning and move on.
    Continue,
    /// Same as `Continue`; kept as a distinct spelling for authored steps.
    Skip,
    /// Always hand the failure to recovery, even if the message is not
    /// recognisably transient.
    Retry,
    /// Surface a pause request to the orchestrator.
    Pause,
    /// Propagate the failure without recovery.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnError {
    pub action: ErrorAction,
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementState {
    #[default]
    Exists,
    Visible,
    Hidden,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlMatch {
    #[default]
    Contains,
    Equals,
    Regex,
}

/// A precondition evaluated before a step is dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Compare a context variable against a literal.
    Variable {
        name: String,
        operator: ConditionOperator,
        #[serde(default)]
        value: Value,
    },
    /// Check an element's presence or visibility on the page.
    Element {
        selector: String,
        #[serde(default)]
        state: ElementState,
    },
    /// Check the page's current URL.
    Url {
        pattern: String,
        #[serde(default, rename = "match")]
        mode: UrlMatch,
    },
    /// Restricted expression over `variables`, `step` and `workflow`.
    Custom { expression: String },
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One declarative unit of automation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Per-step handler budget in milliseconds.
    #[serde(rename = "timeout", default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<OnError>,
    #[serde(default)]
    pub continue_on_error: bool,
    /// Delay after a successful step, in milliseconds.
    #[serde(rename = "wait_after", default, skip_serializing_if = "Option::is_none")]
    pub wait_after_ms: Option<u64>,
}

impl Step {
    pub fn new(id: impl Into<String>, step_type: StepType, action: ActionKind) -> Self {
        Self {
            id: id.into(),
            step_type: Some(step_type),
            action: Some(action),
            target: None,
            value: None,
            timeout_ms: None,
            conditions: Vec::new(),
            on_error: None,
            continue_on_error: false,
            wait_after_ms: None,
        }
    }

    pub fn with_target(mut self, target: Selector) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_on_error(mut self, action: ErrorAction) -> Self {
        self.on_error = Some(OnError { action });
        self
    }

    /// The `value` field as a string, if it is one.
    pub fn value_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(Value::as_str)
    }

    /// Key used for historical timing lookups: the target's primary
    /// selector when present, otherwise `<type>:<id>`.
    pub fn timing_key(&self) -> String {
        match (&self.target, self.step_type) {
            (Some(target), _) => target.primary.clone(),
            (None, Some(t)) => format!("{t}:{}", self.id),
            (None, None) => self.id.clone(),
        }
    }
}
