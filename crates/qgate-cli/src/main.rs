mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    anomaly::AnomalySubcommand, config::ConfigSubcommand, gate::GateSubcommand,
    pattern::PatternSubcommand, task::TaskSubcommand, threshold::ThresholdSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "qgate",
    about = "Quality gates, pattern confidence tracking, and anomaly escalation",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .qgate/ or .git/)
    #[arg(long, global = true, env = "QGATE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Workflow-state document (default: .qgate/control/workflow-state.json)
    #[arg(long, global = true, env = "WORKFLOW_STATE_PATH")]
    workflow_state: Option<PathBuf>,

    /// Quality-dashboard document (default: .qgate/control/quality-dashboard.json)
    #[arg(long, global = true, env = "QUALITY_DASHBOARD_PATH")]
    dashboard: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize qgate in the current project
    Init,

    /// Inspect patterns and record application outcomes
    Pattern {
        #[command(subcommand)]
        subcommand: PatternSubcommand,
    },

    /// Run quality gates against artifacts
    Gate {
        #[command(subcommand)]
        subcommand: GateSubcommand,
    },

    /// Detect quality score anomalies
    Anomaly {
        #[command(subcommand)]
        subcommand: AnomalySubcommand,
    },

    /// Manage follow-up tasks in the workflow-state document
    Task {
        #[command(subcommand)]
        subcommand: TaskSubcommand,
    },

    /// Resolve gate thresholds and manage phase adjustments
    Threshold {
        #[command(subcommand)]
        subcommand: ThresholdSubcommand,
    },

    /// Ask the learning system for guidance on a gate type
    Guidance {
        gate_type: String,
        /// JSON payload sent with the request (default: {})
        #[arg(long)]
        payload: Option<String>,
    },

    /// Show or validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let docs = root::ControlDocs::resolve(
        &root,
        cli.workflow_state.as_deref(),
        cli.dashboard.as_deref(),
    );

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, &docs),
        Commands::Pattern { subcommand } => cmd::pattern::run(&root, subcommand, cli.json),
        Commands::Gate { subcommand } => cmd::gate::run(&root, &docs, subcommand, cli.json),
        Commands::Anomaly { subcommand } => cmd::anomaly::run(&docs, subcommand, cli.json),
        Commands::Task { subcommand } => cmd::task::run(&docs, subcommand, cli.json),
        Commands::Threshold { subcommand } => {
            cmd::threshold::run(&root, &docs, subcommand, cli.json)
        }
        Commands::Guidance { gate_type, payload } => {
            cmd::guidance::run(&root, &gate_type, payload.as_deref())
        }
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
