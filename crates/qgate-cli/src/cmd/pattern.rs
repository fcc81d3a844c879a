use crate::output::{fmt_score, print_json, print_table};
use anyhow::Context;
use clap::{ArgGroup, Subcommand};
use qgate_core::{
    confidence,
    learning::{self, OutcomeEntry},
    paths,
    pattern::{Pattern, PatternStore},
};
use serde_json::json;
use std::path::Path;

#[derive(Subcommand)]
pub enum PatternSubcommand {
    /// List patterns in file order
    List,

    /// Show a single pattern
    Show { id: String },

    /// Record a real-world application outcome for a pattern
    #[command(group(ArgGroup::new("outcome").required(true).args(["success", "failure"])))]
    Record {
        id: String,
        /// The pattern fixed the defect
        #[arg(long)]
        success: bool,
        /// The pattern did not fix the defect
        #[arg(long)]
        failure: bool,
        /// Gate type the pattern was applied under (decision log only)
        #[arg(long, default_value = "general")]
        gate_type: String,
        /// Invoking mode (decision log only)
        #[arg(long, default_value = "default")]
        mode: String,
    },
}

pub fn run(root: &Path, subcmd: PatternSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PatternSubcommand::List => list(root, json),
        PatternSubcommand::Show { id } => show(root, &id, json),
        PatternSubcommand::Record {
            id,
            success,
            gate_type,
            mode,
            ..
        } => record(root, &id, success, &gate_type, &mode, json),
    }
}

fn load_store(root: &Path) -> anyhow::Result<PatternStore> {
    PatternStore::initialize(&paths::patterns_path(root))
        .context("failed to load patterns (run 'qgate init' first?)")
}

// ---------------------------------------------------------------------------
// list / show
// ---------------------------------------------------------------------------

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let store = load_store(root)?;
    let patterns = store.recommended_patterns();

    if json {
        print_json(&patterns)?;
        return Ok(());
    }
    if patterns.is_empty() {
        println!("No patterns.");
        return Ok(());
    }

    let rows = patterns
        .iter()
        .map(|p| {
            let usage = p.usage();
            vec![
                p.id.clone(),
                p.confidence_score.map(fmt_score).unwrap_or_else(|| "-".into()),
                fmt_score(p.success_rate),
                format!(
                    "{}/{}",
                    usage.successful_applications, usage.total_applications
                ),
            ]
        })
        .collect();
    print_table(&["ID", "CONFIDENCE", "SUCCESS", "APPLIED"], rows);
    Ok(())
}

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let store = load_store(root)?;
    let pattern = store.require_pattern(id)?;

    if json {
        print_json(pattern)?;
    } else {
        print_pattern(pattern);
    }
    Ok(())
}

fn print_pattern(p: &Pattern) {
    let usage = p.usage();
    println!("Pattern:      {}", p.id);
    println!(
        "Confidence:   {}",
        p.confidence_score.map(fmt_score).unwrap_or_else(|| "-".into())
    );
    println!("Success rate: {}", fmt_score(p.success_rate));
    println!(
        "Applications: {} total, {} successful, {} failed",
        usage.total_applications, usage.successful_applications, usage.failed_applications
    );
}

// ---------------------------------------------------------------------------
// record
// ---------------------------------------------------------------------------

fn record(
    root: &Path,
    id: &str,
    success: bool,
    gate_type: &str,
    mode: &str,
    json: bool,
) -> anyhow::Result<()> {
    let mut store = load_store(root)?;
    let confidence = confidence::update_pattern_outcome(&mut store, id, success)?;
    store.save().context("failed to save patterns")?;

    let pattern = store.require_pattern(id)?;
    let usage = *pattern.usage();
    let result = if success { "success" } else { "failure" };
    learning::log_outcome(
        &paths::decision_log_path(root),
        &OutcomeEntry {
            mode: mode.to_string(),
            gate_type: gate_type.to_string(),
            result: result.to_string(),
            confidence,
            context: json!({ "pattern_id": id }),
            successful_applications: usage.successful_applications,
            failed_applications: usage.failed_applications,
        },
    );

    if json {
        print_json(pattern)?;
    } else {
        println!("Recorded {result} for [{id}]: confidence {}", fmt_score(confidence));
    }
    Ok(())
}
