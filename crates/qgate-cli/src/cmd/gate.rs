use crate::cmd::read_json_file;
use crate::output::{fmt_score, print_json};
use crate::root::ControlDocs;
use anyhow::Context;
use clap::Subcommand;
use qgate_core::{
    anomaly::AnomalyDetector,
    check::{Artifact, ConfiguredCheckRunner},
    config::Config,
    document::FileDocument,
    gate::{GateReport, QualityGate},
    score::QualityMetrics,
    threshold::ThresholdResolver,
    workflow::WorkflowTaskWriter,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum GateSubcommand {
    /// Evaluate an artifact against the checks configured for a gate type
    Run {
        /// File to evaluate
        artifact: PathBuf,
        #[arg(long, default_value = "general")]
        gate_type: String,
        /// Invoking mode; metrics are keyed by "<mode>_<gate_type>"
        #[arg(long, default_value = "default")]
        mode: String,
        /// Previous metrics record (JSON); the new result is checked for anomalies against it
        #[arg(long)]
        baseline: Option<PathBuf>,
    },

    /// List the checks configured for a gate type
    Checks { gate_type: String },
}

pub fn run(
    root: &Path,
    docs: &ControlDocs,
    subcmd: GateSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    match subcmd {
        GateSubcommand::Run {
            artifact,
            gate_type,
            mode,
            baseline,
        } => run_gate(
            root,
            docs,
            &artifact,
            &gate_type,
            &mode,
            baseline.as_deref(),
            json,
        ),
        GateSubcommand::Checks { gate_type } => checks(root, &gate_type, json),
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn run_gate(
    root: &Path,
    docs: &ControlDocs,
    artifact_path: &Path,
    gate_type: &str,
    mode: &str,
    baseline: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let artifact = Artifact::from_path(artifact_path)
        .with_context(|| format!("failed to read artifact {}", artifact_path.display()))?;

    let runner = ConfiguredCheckRunner::new(root, config.checks);
    let mut gate = QualityGate::new(mode, runner, ThresholdResolver::for_root(root));
    let report = gate.run(&artifact, gate_type);

    let anomaly_task = match (baseline, report.metrics()) {
        (Some(path), Some(metrics)) => Some(check_anomaly(docs, mode, path, metrics)?),
        _ => None,
    };

    if json {
        let mut value = serde_json::to_value(&report)?;
        if let (Some(task), Value::Object(fields)) = (&anomaly_task, &mut value) {
            fields.insert("anomaly_task".to_string(), json!(task));
        }
        print_json(&value)?;
    } else {
        print_report(&report);
        match anomaly_task {
            Some(Some(task_id)) => println!("Anomaly detected; created task [{task_id}]"),
            Some(None) => println!("No anomaly against baseline."),
            None => {}
        }
    }
    Ok(())
}

fn check_anomaly(
    docs: &ControlDocs,
    mode: &str,
    baseline_path: &Path,
    current: &QualityMetrics,
) -> anyhow::Result<Option<String>> {
    let raw = read_json_file(baseline_path)?;
    let previous: QualityMetrics = serde_json::from_value(raw)
        .with_context(|| format!("{} is not a metrics record", baseline_path.display()))?;

    let mut detector = AnomalyDetector::new(
        mode,
        FileDocument::new(&docs.dashboard),
        WorkflowTaskWriter::new(FileDocument::new(&docs.workflow_state)),
    );
    detector.observe(&previous);
    Ok(detector.detect(current)?)
}

fn print_report(report: &GateReport) {
    match report {
        GateReport::Evaluated { metrics, checks } => {
            let verdict = if metrics.passed { "PASSED" } else { "FAILED" };
            println!(
                "Gate '{}' (mode {}): {verdict}  score {} / threshold {}",
                metrics.gate_type,
                metrics.mode,
                fmt_score(metrics.overall_score),
                fmt_score(metrics.threshold)
            );
            if checks.is_empty() {
                println!("  (no checks configured)");
            }
            for c in checks {
                let mark = if c.passed { "pass" } else { "FAIL" };
                let detail = c
                    .detail
                    .as_deref()
                    .and_then(|d| d.lines().last())
                    .map(|d| format!("  {d}"))
                    .unwrap_or_default();
                println!("  [{mark}] {}  {}{detail}", c.check, fmt_score(c.score));
            }
        }
        GateReport::Rejected {
            error_type,
            message,
            ..
        } => {
            println!("Gate rejected ({error_type}): {message}");
        }
    }
}

// ---------------------------------------------------------------------------
// checks
// ---------------------------------------------------------------------------

fn checks(root: &Path, gate_type: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let runner = ConfiguredCheckRunner::new(root, config.checks);
    let defs = runner.checks_for(gate_type);

    if json {
        print_json(&defs)?;
        return Ok(());
    }
    if defs.is_empty() {
        println!("No checks configured for gate '{gate_type}'.");
        return Ok(());
    }
    for def in defs {
        println!("{}: {:?}", def.name, def.check_type);
    }
    Ok(())
}
