//! CLI command definitions for the `stepforge` binary.

pub mod classify;
pub mod run;
pub mod validate;
pub mod wait_plan;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use stepforge_types::step::ActionKind;

/// Run and inspect resilient browser workflows.
#[derive(Parser)]
#[command(name = "stepforge", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs to stderr as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "STEPFORGE_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check workflow files without running them.
    Validate {
        /// A workflow YAML file or a directory to scan.
        path: PathBuf,
    },

    /// Dry-run a workflow against a recorded page snapshot.
    Run {
        /// Path to the workflow YAML file.
        workflow: PathBuf,

        /// Page snapshot (JSON) to run against.
        #[arg(long)]
        snapshot: PathBuf,

        /// Override a workflow variable (repeatable). Values parse as JSON
        /// when possible.
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Do not write learned selector weights and timings back.
        #[arg(long)]
        no_learn: bool,
    },

    /// Show the wait strategy chosen for an action.
    WaitPlan {
        action: ActionArg,

        /// Observed network latency.
        #[arg(long)]
        latency_ms: Option<f64>,

        /// Observed downstream throughput.
        #[arg(long)]
        throughput_kbps: Option<f64>,

        /// DOM node count of the page.
        #[arg(long, default_value = "0")]
        dom_nodes: u32,

        /// Selector whose learned timing history should bias the plan.
        #[arg(long)]
        selector: Option<String>,
    },

    /// Classify an error message and show the recovery strategy.
    Classify {
        /// The error message.
        message: String,

        /// Error code reported alongside the message.
        #[arg(long)]
        code: Option<String>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
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
}

impl From<ActionArg> for ActionKind {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Navigate => ActionKind::Navigate,
            ActionArg::Click => ActionKind::Click,
            ActionArg::Hover => ActionKind::Hover,
            ActionArg::Scroll => ActionKind::Scroll,
            ActionArg::Type => ActionKind::Type,
            ActionArg::Select => ActionKind::Select,
            ActionArg::Wait => ActionKind::Wait,
            ActionArg::Extract => ActionKind::Extract,
            ActionArg::Validate => ActionKind::Validate,
            ActionArg::Screenshot => ActionKind::Screenshot,
        }
    }
}
