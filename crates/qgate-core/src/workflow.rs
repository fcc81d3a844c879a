//! Follow-up tasks appended to the workflow-state document.
//!
//! Layout:
//!   .qgate/control/workflow-state.json   : `{ "active_tasks": [...], ... }`
//!
//! IDs are `task_<epoch millis>`. Two tasks created within the same
//! millisecond share an id.

use crate::document::{self, DocumentStore};
use crate::error::{QgateError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ACTIVE_TASKS_KEY: &str = "active_tasks";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Fields written by other tools.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub fn task_id_at(now: DateTime<Utc>) -> String {
    format!("task_{}", now.timestamp_millis())
}

pub struct WorkflowTaskWriter<D> {
    store: D,
}

impl<D: DocumentStore> WorkflowTaskWriter<D> {
    pub fn new(store: D) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    /// Append a task and return its id. A blank `warning` is a caller bug.
    pub fn create_quality_task(&self, warning: &str, context: Value) -> Result<String> {
        if warning.trim().is_empty() {
            return Err(QgateError::InvalidInput(
                "Invalid warning: objective must be a non-empty string".to_string(),
            ));
        }

        let mut doc = document::read_object(&self.store);
        let now = Utc::now();
        let task = TaskRecord {
            task_id: task_id_at(now),
            objective: warning.to_string(),
            context,
            created_at: Some(now),
            extra: Map::new(),
        };
        let task_id = task.task_id.clone();
        document::ensure_array(&mut doc, ACTIVE_TASKS_KEY).push(serde_json::to_value(&task)?);
        document::write_object(&self.store, &doc)?;

        tracing::info!("created task {task_id} in {}: {warning}", self.store.describe());
        Ok(task_id)
    }

    /// Typed view of `active_tasks`; entries that do not parse are skipped.
    pub fn list_tasks(&self) -> Vec<TaskRecord> {
        let doc = document::read_object(&self.store);
        let Some(Value::Array(items)) = doc.get(ACTIVE_TASKS_KEY) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }
}
