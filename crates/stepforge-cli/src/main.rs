//! Stepforge CLI entry point.
//!
//! Binary name: `stepforge`
//!
//! Parses arguments, sets up tracing, loads engine state from the data
//! directory and dispatches to a command handler.

mod cli;
mod state;

use anyhow::bail;
use clap::Parser;
use clap_complete::generate;
use stepforge_core::timing::TimingController;
use stepforge_observe::tracing_setup::{
    TracingOptions, filter_for_verbosity, init_tracing, shutdown_tracing,
};
use stepforge_types::workflow::RunStatus;

use cli::run::RunArgs;
use cli::wait_plan::WaitPlanArgs;
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&TracingOptions {
        default_filter: filter_for_verbosity(cli.verbose, cli.quiet).to_string(),
        json: cli.log_json,
        enable_otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    // Commands that need no engine state
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(*shell, &mut cmd, "stepforge", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Validate { path } => return cli::validate::handle_validate(path, cli.json),
        _ => {}
    }

    let state = AppState::init().await?;

    match cli.command {
        Commands::Run {
            workflow,
            snapshot,
            vars,
            no_learn,
        } => {
            let status = cli::run::handle_run(
                &state,
                RunArgs {
                    workflow: &workflow,
                    snapshot: &snapshot,
                    vars: &vars,
                    learn: !no_learn,
                    json: cli.json,
                },
            )
            .await?;
            if status != RunStatus::Completed {
                bail!("Workflow run {status}");
            }
        }

        Commands::WaitPlan {
            action,
            latency_ms,
            throughput_kbps,
            dom_nodes,
            selector,
        } => {
            let controller = TimingController::new(state.config.timing.clone());
            cli::wait_plan::handle_wait_plan(
                &controller,
                &state.history,
                &WaitPlanArgs {
                    action: action.into(),
                    latency_ms,
                    throughput_kbps,
                    dom_nodes,
                    selector,
                },
                cli.json,
            )?;
        }

        Commands::Classify { message, code } => {
            cli::classify::handle_classify(
                &message,
                code.as_deref(),
                &state.config.recovery,
                cli.json,
            )?;
        }

        Commands::Validate { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}
