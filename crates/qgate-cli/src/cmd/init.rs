use crate::root::ControlDocs;
use anyhow::Context;
use qgate_core::{config::Config, io, paths, phase::ThresholdConfig};
use serde_json::{json, Value};
use std::path::Path;

pub fn run(root: &Path, docs: &ControlDocs) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    println!("Initializing qgate in: {}", root.display());

    // 1. Directory structure
    for dir in [paths::QGATE_DIR, paths::RULES_DIR, paths::CONTROL_DIR] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    // 2. config.yaml
    let config_path = paths::config_path(root);
    if !config_path.exists() {
        Config::new(&project_name)
            .save(root)
            .context("failed to write config.yaml")?;
        report(root, &config_path, true);
    } else {
        report(root, &config_path, false);
    }

    // 3. Empty pattern file
    let patterns_path = paths::patterns_path(root);
    let created = io::write_if_missing(&patterns_path, b"[]\n")
        .context("failed to write patterns.json")?;
    report(root, &patterns_path, created);

    // 4. Control documents
    let workflow = json!({ "active_tasks": [] });
    write_doc_if_missing(root, &docs.workflow_state, &workflow)?;
    write_doc_if_missing(root, &docs.dashboard, &initial_dashboard()?)?;

    println!("\nqgate initialized successfully.");
    println!("Next: qgate gate run <artifact> --gate-type general");
    Ok(())
}

fn initial_dashboard() -> anyhow::Result<Value> {
    let mut dashboard = serde_json::to_value(ThresholdConfig::baseline())?;
    if let Value::Object(fields) = &mut dashboard {
        fields.insert("predictive_quality_indicators".to_string(), json!([]));
    }
    Ok(dashboard)
}

fn write_doc_if_missing(root: &Path, path: &Path, doc: &Value) -> anyhow::Result<()> {
    let data = serde_json::to_string_pretty(doc)?;
    let created = io::write_if_missing(path, data.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    report(root, path, created);
    Ok(())
}

fn report(root: &Path, path: &Path, created: bool) {
    let shown = path.strip_prefix(root).unwrap_or(path);
    if created {
        println!("  created: {}", shown.display());
    } else {
        println!("  exists:  {}", shown.display());
    }
}
