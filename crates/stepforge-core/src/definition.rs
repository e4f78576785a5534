//! Workflow definition parsing, validation and file loading.
//!
//! YAML is the authoring format. Validation is structural only: it rejects
//! what the executor would reject as `Structural` before any step runs, so
//! a bad file fails up front instead of halfway through a run.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use stepforge_types::step::{Condition, StepType, UrlMatch};
use stepforge_types::workflow::Workflow;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse and validate a workflow from YAML.
pub fn parse_workflow_yaml(yaml: &str) -> Result<Workflow, WorkflowError> {
    let workflow: Workflow =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::Parse(e.to_string()))?;
    validate_definition(&workflow)?;
    Ok(workflow)
}

pub fn serialize_workflow_yaml(workflow: &Workflow) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(workflow).map_err(|e| WorkflowError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check structural constraints:
/// - name is non-empty
/// - at least one step
/// - every step has a non-empty, unique id, a type and an action
/// - targets have a non-empty primary selector
/// - timeouts are positive
/// - custom conditions are non-empty and regex url conditions compile
pub fn validate_definition(workflow: &Workflow) -> Result<(), WorkflowError> {
    if workflow.name.trim().is_empty() {
        return Err(WorkflowError::Validation(
            "workflow name must not be empty".to_string(),
        ));
    }
    if workflow.steps.is_empty() {
        return Err(WorkflowError::Validation(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for (index, step) in workflow.steps.iter().enumerate() {
        let label = if step.id.is_empty() {
            format!("step #{}", index + 1)
        } else {
            format!("step '{}'", step.id)
        };
        let invalid = |reason: &str| Err(WorkflowError::Validation(format!("{label}: {reason}")));

        if step.id.trim().is_empty() {
            return invalid("missing id");
        }
        if !seen.insert(step.id.as_str()) {
            return invalid("duplicate id");
        }
        if step.step_type.is_none() {
            return invalid("missing type");
        }
        if step.action.is_none() {
            return invalid("missing action");
        }
        if step.target.as_ref().is_some_and(|t| t.primary.trim().is_empty()) {
            return invalid("target has an empty primary selector");
        }
        if step.timeout_ms == Some(0) {
            return invalid("timeout must be > 0");
        }
        for condition in &step.conditions {
            match condition {
                Condition::Custom { expression } if expression.trim().is_empty() => {
                    return invalid("empty custom condition");
                }
                Condition::Url {
                    pattern,
                    mode: UrlMatch::Regex,
                } => {
                    if let Err(e) = regex::Regex::new(pattern) {
                        return Err(WorkflowError::Validation(format!(
                            "{label}: invalid url pattern '{pattern}': {e}"
                        )));
                    }
                }
                _ => {}
            }
        }
    }

    Ok(())
}

/// Step types a workflow needs handlers for, in a stable order.
pub fn required_step_types(workflow: &Workflow) -> Vec<StepType> {
    workflow
        .steps
        .iter()
        .filter_map(|s| s.step_type)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

pub fn load_workflow_file(path: &Path) -> Result<Workflow, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

/// Write a workflow as YAML, creating parent directories.
pub fn save_workflow_file(path: &Path, workflow: &Workflow) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serialize_workflow_yaml(workflow)?)?;
    Ok(())
}

/// Every `.yaml`/`.yml` file under `dir`, recursively, with its parse
/// outcome. Invalid files are reported rather than skipped.
pub fn discover_workflows(
    dir: &Path,
) -> Result<Vec<(PathBuf, Result<Workflow, WorkflowError>)>, WorkflowError> {
    let mut out = Vec::new();
    if dir.exists() {
        discover_recursive(dir, &mut out)?;
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

fn discover_recursive(
    dir: &Path,
    out: &mut Vec<(PathBuf, Result<Workflow, WorkflowError>)>,
) -> Result<(), WorkflowError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            discover_recursive(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml")
        {
            let parsed = load_workflow_file(&path);
            if let Err(e) = &parsed {
                tracing::debug!(?path, error = %e, "workflow file failed to load");
            }
            out.push((path, parsed));
        }
    }
    Ok(())
}
