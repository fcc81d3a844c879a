use crate::cmd::parse_json_arg;
use crate::output::{fmt_score, print_json, print_table};
use crate::root::ControlDocs;
use clap::Subcommand;
use qgate_core::{
    document::FileDocument,
    phase::{self, PhaseOrchestrator, ProjectPhase, ThresholdConfig},
    threshold::ThresholdResolver,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Subcommand)]
pub enum ThresholdSubcommand {
    /// Resolve the pass threshold a gate run would use (rule file, config, default)
    Resolve { gate_type: String },

    /// Show effective phase thresholds from the quality dashboard
    Show {
        /// Show a single gate type
        #[arg(long)]
        gate: Option<String>,
    },

    /// Move to a project phase and rescale dashboard thresholds
    Phase {
        /// init, dev, stabilization, or release
        phase: String,
        /// Success-rate feedback, e.g. '{"security": {"success_rate": 0.95}}'
        #[arg(long)]
        feedback: Option<String>,
    },

    /// Apply success-rate feedback to the learning adjustments
    Feedback { feedback: String },
}

pub fn run(
    root: &Path,
    docs: &ControlDocs,
    subcmd: ThresholdSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    let orchestrator = PhaseOrchestrator::new(FileDocument::new(&docs.dashboard));
    match subcmd {
        ThresholdSubcommand::Resolve { gate_type } => resolve(root, &gate_type, json),
        ThresholdSubcommand::Show { gate } => show(&orchestrator, gate.as_deref(), json),
        ThresholdSubcommand::Phase { phase, feedback } => {
            transition(&orchestrator, &phase, feedback.as_deref(), json)
        }
        ThresholdSubcommand::Feedback { feedback } => {
            apply_feedback(&orchestrator, &feedback, json)
        }
    }
}

fn resolve(root: &Path, gate_type: &str, json: bool) -> anyhow::Result<()> {
    let threshold = ThresholdResolver::for_root(root).resolve(gate_type);
    if json {
        print_json(&json!({ "gate_type": gate_type, "threshold": threshold }))?;
    } else {
        println!("{gate_type}: {}", fmt_score(threshold));
    }
    Ok(())
}

fn show(
    orchestrator: &PhaseOrchestrator<FileDocument>,
    gate: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let effective = orchestrator.effective_thresholds(gate)?;
    if json {
        print_json(&effective)?;
    } else {
        print_thresholds(&effective);
    }
    Ok(())
}

fn transition(
    orchestrator: &PhaseOrchestrator<FileDocument>,
    phase: &str,
    feedback: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let phase: ProjectPhase = phase.parse()?;
    let feedback = match feedback {
        Some(raw) => Some(phase::parse_feedback(&parse_json_arg(raw, "--feedback")?)?),
        None => None,
    };
    let updated = orchestrator.handle_phase_transition(phase, feedback.as_ref())?;
    print_config(&updated, json)
}

fn apply_feedback(
    orchestrator: &PhaseOrchestrator<FileDocument>,
    raw: &str,
    json: bool,
) -> anyhow::Result<()> {
    let feedback = phase::parse_feedback(&parse_json_arg(raw, "feedback")?)?;
    let updated = orchestrator.update_learning_adjustments(&feedback)?;
    print_config(&updated, json)
}

fn print_config(config: &ThresholdConfig, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(config);
    }
    println!("Phase: {}", config.project_phase);
    let rows = config
        .gate_thresholds
        .iter()
        .map(|(gate, base)| {
            let adj = config.learning_adjustments.get(gate).copied().unwrap_or(0.0);
            vec![gate.clone(), fmt_score(*base), format!("{adj:+.3}")]
        })
        .collect();
    print_table(&["GATE", "THRESHOLD", "ADJUSTMENT"], rows);
    Ok(())
}

fn print_thresholds(effective: &BTreeMap<String, f64>) {
    let rows = effective
        .iter()
        .map(|(gate, t)| vec![gate.clone(), fmt_score(*t)])
        .collect();
    print_table(&["GATE", "EFFECTIVE"], rows);
}
