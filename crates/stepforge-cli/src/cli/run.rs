//! `stepforge run`: dry-run a workflow against a page snapshot.
//!
//! The engine is wired exactly as a live driver would wire it; only the
//! page is replaced by [`SnapshotPage`]. Selector weights and timings
//! learned during the run are written back to the data directory.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;
use stepforge_core::definition::{WorkflowError, load_workflow_file};
use stepforge_core::executor::StepExecutor;
use stepforge_core::handlers::{HandlerTools, register_builtin_handlers};
use stepforge_core::page::BoxPage;
use stepforge_core::resolver::ElementResolver;
use stepforge_core::runner::{RunReport, WorkflowRunner};
use stepforge_core::timing::TimingController;
use stepforge_infra::snapshot_page::{PageSnapshot, SnapshotPage};
use stepforge_infra::telemetry::SampledNetworkTelemetry;
use stepforge_types::event::StepEvent;
use stepforge_types::result::StepStatus;
use stepforge_types::workflow::RunStatus;
use tokio::sync::broadcast;

use crate::state::AppState;

pub struct RunArgs<'a> {
    pub workflow: &'a Path,
    pub snapshot: &'a Path,
    pub vars: &'a [String],
    pub learn: bool,
    pub json: bool,
}

/// Parse `KEY=VALUE` overrides. Values that parse as JSON keep their type;
/// anything else is a string.
pub fn parse_vars(raw: &[String]) -> Result<HashMap<String, Value>> {
    let mut out = HashMap::new();
    for item in raw {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid --var '{item}': expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid --var '{item}': empty key");
        }
        let value =
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        out.insert(key.to_string(), value);
    }
    Ok(out)
}

pub async fn handle_run(state: &AppState, args: RunArgs<'_>) -> Result<RunStatus> {
    let workflow = load_workflow_file(args.workflow).map_err(|e| match e {
        WorkflowError::Parse(msg) => anyhow!("Failed to parse workflow YAML: {msg}"),
        WorkflowError::Validation(msg) => anyhow!("Workflow validation failed: {msg}"),
        other => anyhow!("Failed to load workflow: {other}"),
    })?;
    let overrides = parse_vars(args.vars)?;

    let snapshot = PageSnapshot::load(args.snapshot)
        .await
        .with_context(|| format!("Failed to load page snapshot {}", args.snapshot.display()))?;
    let telemetry = Arc::new(SampledNetworkTelemetry::default());
    for sample in &snapshot.network {
        telemetry.record_sample(sample.latency_ms, sample.throughput_kbps);
    }
    let page = SnapshotPage::new(snapshot).context("Invalid page snapshot")?;
    let actions = page.action_log();

    let runner = Arc::new(build_runner(state, telemetry));
    let mut ctx = runner.prepare_context(&workflow, Some(BoxPage::new(page)), overrides);

    let progress = (!args.json).then(|| spawn_progress(runner.executor().events().subscribe()));
    let interrupt = {
        let runner = Arc::clone(&runner);
        let run_id = ctx.run_id;
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!(%run_id, "interrupt received, cancelling run");
                if let Err(e) = runner.cancel_run(run_id) {
                    tracing::debug!("cancel after interrupt: {e}");
                }
            }
        })
    };

    let outcome = runner.run(&workflow, &mut ctx).await;
    interrupt.abort();
    if let Some(progress) = progress {
        progress.abort();
    }
    let report = outcome?;
    let actions = actions.lock().unwrap_or_else(|p| p.into_inner()).clone();

    if args.learn {
        state.persist().await?;
    }

    if args.json {
        let out = serde_json::json!({
            "report": report,
            "variables": ctx.all_variables(),
            "actions": actions,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_report(&report, &actions);
    }
    Ok(report.status)
}

fn build_runner(state: &AppState, telemetry: Arc<SampledNetworkTelemetry>) -> WorkflowRunner {
    let history = Arc::new(state.history.clone());
    let resolver = Arc::new(ElementResolver::new(
        Arc::new(state.selectors.clone()),
        &state.config.resolver,
    ));
    let timing = Arc::new(TimingController::new(state.config.timing.clone()));

    let mut executor = StepExecutor::new(&state.config)
        .with_resolver(Arc::clone(&resolver))
        .with_timing_history(history.clone());
    let tools = HandlerTools::new(resolver, timing)
        .with_network(telemetry)
        .with_history(history);
    register_builtin_handlers(&mut executor, &tools);
    WorkflowRunner::new(Arc::new(executor))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn spawn_progress(mut rx: broadcast::Receiver<StepEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("  {} {n} events dropped", style("!").yellow());
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &StepEvent) {
    match event {
        StepEvent::StepStarted {
            step_id, attempt, ..
        } if *attempt > 1 => {
            eprintln!("  {} {step_id} (attempt {attempt})", style("~").yellow());
        }
        StepEvent::StepCompleted { step_id, result, .. } => {
            eprintln!(
                "  {} {step_id} {}",
                style("*").green(),
                style(format!("{}ms", result.execution_time_ms)).dim()
            );
        }
        StepEvent::StepFailed {
            step_id,
            result,
            will_retry,
            ..
        } => {
            let message = result.error().map(|e| e.message.as_str()).unwrap_or("failed");
            let marker = if *will_retry {
                style("~").yellow()
            } else {
                style("x").red()
            };
            eprintln!("  {marker} {step_id}: {message}");
        }
        StepEvent::StepError { step_id, error, .. } => {
            eprintln!("  {} {step_id}: {}", style("-").dim(), error.message);
        }
        StepEvent::StepCancelled { step_id, .. } => {
            eprintln!("  {} {step_id} cancelled", style("x").red());
        }
        _ => {}
    }
}

fn status_cell(status: StepStatus) -> Cell {
    let color = match status {
        StepStatus::Completed => Color::Green,
        _ => Color::Red,
    };
    Cell::new(status.to_string()).fg(color)
}

fn print_report(report: &RunReport, actions: &[String]) {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Attempt"),
            Cell::new("Status"),
            Cell::new("Time"),
            Cell::new("Detail"),
        ]);
    for result in &report.results {
        let detail = result
            .error()
            .map(|e| e.message.clone())
            .or_else(|| result.warning().map(str::to_string))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(&result.step_id),
            Cell::new(result.attempt),
            status_cell(result.status),
            Cell::new(format!("{}ms", result.execution_time_ms)),
            Cell::new(detail),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    let headline = style(report.status.to_string()).bold();
    let headline = match report.status {
        RunStatus::Completed => headline.green(),
        RunStatus::Paused => headline.yellow(),
        RunStatus::Failed | RunStatus::Cancelled => headline.red(),
    };
    println!(
        "  Workflow '{}' {headline} in {}ms",
        style(&report.workflow_name).cyan(),
        report.duration_ms
    );
    println!("  Run ID: {}", report.run_id);
    if let Some(index) = report.paused_at {
        println!("  Paused before step #{}", index + 1);
    }
    if let Some(error) = &report.error {
        println!("  Error: {error}");
    }
    println!(
        "  Steps: {} completed, {} failed, {} skipped, {} retries",
        report.metrics.steps_completed,
        report.metrics.steps_failed,
        report.metrics.steps_skipped,
        report.metrics.retries
    );
    if !actions.is_empty() {
        println!("  Page actions: {}", style(actions.join(", ")).dim());
    }
    println!();
}
