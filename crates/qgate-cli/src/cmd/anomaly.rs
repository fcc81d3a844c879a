use crate::cmd::read_json_file;
use crate::output::print_json;
use crate::root::ControlDocs;
use clap::Subcommand;
use qgate_core::{anomaly::AnomalyDetector, document::FileDocument, workflow::WorkflowTaskWriter};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum AnomalySubcommand {
    /// Compare two metrics records; a score swing of 0.1 or more files a task
    Check {
        /// Earlier metrics record (JSON file)
        previous: PathBuf,
        /// Newer metrics record (JSON file)
        current: PathBuf,
        #[arg(long, default_value = "default")]
        mode: String,
    },
}

pub fn run(docs: &ControlDocs, subcmd: AnomalySubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        AnomalySubcommand::Check {
            previous,
            current,
            mode,
        } => check(docs, &previous, &current, &mode, json),
    }
}

fn check(
    docs: &ControlDocs,
    previous: &Path,
    current: &Path,
    mode: &str,
    json: bool,
) -> anyhow::Result<()> {
    let previous = read_json_file(previous)?;
    let current = read_json_file(current)?;

    let mut detector = AnomalyDetector::new(
        mode,
        FileDocument::new(&docs.dashboard),
        WorkflowTaskWriter::new(FileDocument::new(&docs.workflow_state)),
    );
    // The first record only seeds the baseline.
    detector.detect_value(&previous)?;
    let task_id = detector.detect_value(&current)?;

    if json {
        print_json(&json!({ "anomaly": task_id.is_some(), "task_id": task_id }))?;
    } else {
        match task_id {
            Some(id) => println!("Anomaly detected; created task [{id}]"),
            None => println!("No anomaly."),
        }
    }
    Ok(())
}
