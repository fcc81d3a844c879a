use crate::cmd::parse_json_arg;
use crate::output::{print_json, print_table};
use crate::root::ControlDocs;
use clap::Subcommand;
use qgate_core::{document::FileDocument, workflow::WorkflowTaskWriter};
use serde_json::{json, Value};

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// Append a follow-up task to the workflow-state document
    Create {
        #[arg(required = true)]
        warning: Vec<String>,
        /// JSON payload stored with the task
        #[arg(long)]
        context: Option<String>,
    },
    /// List active tasks
    List,
}

pub fn run(docs: &ControlDocs, subcmd: TaskSubcommand, json: bool) -> anyhow::Result<()> {
    let writer = WorkflowTaskWriter::new(FileDocument::new(&docs.workflow_state));
    match subcmd {
        TaskSubcommand::Create { warning, context } => {
            create(&writer, &warning.join(" "), context.as_deref(), json)
        }
        TaskSubcommand::List => list(&writer, json),
    }
}

fn create(
    writer: &WorkflowTaskWriter<FileDocument>,
    warning: &str,
    context: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let context = match context {
        Some(raw) => parse_json_arg(raw, "--context")?,
        None => json!({}),
    };
    let task_id = writer.create_quality_task(warning, context)?;

    if json {
        print_json(&json!({ "task_id": task_id, "objective": warning }))?;
    } else {
        println!("Created task [{task_id}]: {warning}");
    }
    Ok(())
}

fn list(writer: &WorkflowTaskWriter<FileDocument>, json: bool) -> anyhow::Result<()> {
    let tasks = writer.list_tasks();

    if json {
        print_json(&tasks)?;
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No active tasks.");
        return Ok(());
    }

    let rows = tasks
        .iter()
        .map(|t| {
            let created = t
                .created_at
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            let context = match &t.context {
                Value::Null => String::new(),
                other => other.to_string(),
            };
            vec![t.task_id.clone(), t.objective.clone(), created, context]
        })
        .collect();
    print_table(&["ID", "OBJECTIVE", "CREATED", "CONTEXT"], rows);
    Ok(())
}
