//! `stepforge validate`: structural checks for workflow files.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use stepforge_core::definition::{
    WorkflowError, discover_workflows, load_workflow_file, required_step_types,
};
use stepforge_types::workflow::Workflow;

struct Checked {
    path: PathBuf,
    outcome: Result<Workflow, WorkflowError>,
}

pub fn handle_validate(path: &Path, json: bool) -> Result<()> {
    let checked: Vec<Checked> = if path.is_dir() {
        discover_workflows(path)?
            .into_iter()
            .map(|(path, outcome)| Checked { path, outcome })
            .collect()
    } else {
        vec![Checked {
            path: path.to_path_buf(),
            outcome: load_workflow_file(path),
        }]
    };

    if checked.is_empty() {
        bail!("No workflow files found under {}", path.display());
    }
    let invalid = checked.iter().filter(|c| c.outcome.is_err()).count();

    if json {
        let out: Vec<_> = checked
            .iter()
            .map(|c| match &c.outcome {
                Ok(wf) => serde_json::json!({
                    "path": c.path.display().to_string(),
                    "valid": true,
                    "name": wf.name,
                    "steps": wf.steps.len(),
                    "step_types": required_step_types(wf)
                        .iter()
                        .map(|t| t.as_str())
                        .collect::<Vec<_>>(),
                }),
                Err(e) => serde_json::json!({
                    "path": c.path.display().to_string(),
                    "valid": false,
                    "error": e.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_table(&checked);
    }

    if invalid > 0 {
        bail!("{invalid} of {} workflow file(s) failed validation", checked.len());
    }
    Ok(())
}

fn print_table(checked: &[Checked]) {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("File").fg(Color::Cyan),
            Cell::new("Workflow"),
            Cell::new("Steps"),
            Cell::new("Result"),
        ]);

    for c in checked {
        let file = c.path.display().to_string();
        match &c.outcome {
            Ok(wf) => table.add_row(vec![
                Cell::new(file),
                Cell::new(&wf.name),
                Cell::new(wf.steps.len()),
                Cell::new("ok").fg(Color::Green),
            ]),
            Err(e) => table.add_row(vec![
                Cell::new(file),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new(e.to_string()).fg(Color::Red),
            ]),
        };
    }

    println!();
    println!("{table}");
    let valid = checked.iter().filter(|c| c.outcome.is_ok()).count();
    println!(
        "  {} {valid}/{} valid",
        if valid == checked.len() {
            style("*").green().bold()
        } else {
            style("!").red().bold()
        },
        checked.len()
    );
    println!();
}
