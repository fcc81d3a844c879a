//! Quality anomaly detection.
//!
//! Compares each metrics record with the previous one the detector saw for
//! the same `"{mode}_{gate_type}"` key. A score swing of at least
//! [`ANOMALY_SENSITIVITY`] appends an indicator to the quality dashboard and
//! files a remediation task.

use crate::document::{self, DocumentStore};
use crate::error::{QgateError, Result};
use crate::score::{round_to, MetricsTable, QualityMetrics, SCORE_PRECISION};
use crate::workflow::WorkflowTaskWriter;
use serde_json::Value;

pub const ANOMALY_SENSITIVITY: f64 = 0.1;
pub const INDICATORS_KEY: &str = "predictive_quality_indicators";
pub const ANOMALY_OBJECTIVE: &str = "quality anomaly";

pub struct AnomalyDetector<D, W> {
    mode: String,
    dashboard: D,
    tasks: WorkflowTaskWriter<W>,
    baseline: MetricsTable,
}

impl<D: DocumentStore, W: DocumentStore> AnomalyDetector<D, W> {
    pub fn new(mode: impl Into<String>, dashboard: D, tasks: WorkflowTaskWriter<W>) -> Self {
        Self {
            mode: mode.into(),
            dashboard,
            tasks,
            baseline: MetricsTable::new(),
        }
    }

    /// Start from previously recorded metrics (e.g. a quality gate's table).
    pub fn with_baseline(mut self, baseline: MetricsTable) -> Self {
        self.baseline = baseline;
        self
    }

    /// Record `metrics` as the latest observation without checking it.
    pub fn observe(&mut self, metrics: &QualityMetrics) {
        self.baseline.record(self.stamped(metrics));
    }

    pub fn baseline(&self) -> &MetricsTable {
        &self.baseline
    }

    pub fn tasks(&self) -> &WorkflowTaskWriter<W> {
        &self.tasks
    }

    /// Entry point for metrics that arrive as untyped JSON.
    pub fn detect_value(&mut self, metrics: &Value) -> Result<Option<String>> {
        let gate_ok = metrics.get("gate_type").is_some_and(Value::is_string);
        let score_ok = metrics.get("overall_score").is_some_and(Value::is_number);
        let ts_ok = metrics.get("timestamp").is_some_and(Value::is_string);
        if !(gate_ok && score_ok && ts_ok) {
            return Err(invalid(
                "gate_type and timestamp must be strings, overall_score must be a number",
            ));
        }
        let parsed: QualityMetrics = serde_json::from_value(metrics.clone())
            .map_err(|e| invalid(&e.to_string()))?;
        self.detect(&parsed)
    }

    /// Returns the id of the remediation task when an anomaly is found.
    ///
    /// The baseline only advances once the indicator and task are written, so
    /// a failed escalation is retried on the next call with the same metrics.
    pub fn detect(&mut self, metrics: &QualityMetrics) -> Result<Option<String>> {
        validate(metrics)?;
        let current = self.stamped(metrics);

        let Some(previous) = self.baseline.get(&current.mode, &current.gate_type) else {
            tracing::debug!("no baseline for {}; recorded", current.key());
            self.baseline.record(current);
            return Ok(None);
        };
        let from = previous.overall_score;
        let delta = round_to((from - current.overall_score).abs(), SCORE_PRECISION);
        if delta < ANOMALY_SENSITIVITY {
            self.baseline.record(current);
            return Ok(None);
        }

        tracing::info!(
            key = %current.key(),
            from,
            to = current.overall_score,
            "quality anomaly detected"
        );
        self.append_indicator(&current)?;
        let context = serde_json::to_value(&current)?;
        let task_id = self.tasks.create_quality_task(ANOMALY_OBJECTIVE, context)?;
        self.baseline.record(current);
        Ok(Some(task_id))
    }

    fn stamped(&self, metrics: &QualityMetrics) -> QualityMetrics {
        QualityMetrics {
            mode: self.mode.clone(),
            ..metrics.clone()
        }
    }

    fn append_indicator(&self, metrics: &QualityMetrics) -> Result<()> {
        let mut doc = document::read_object(&self.dashboard);
        document::ensure_array(&mut doc, INDICATORS_KEY).push(serde_json::to_value(metrics)?);
        document::write_object(&self.dashboard, &doc)
    }
}

fn invalid(reason: &str) -> QgateError {
    QgateError::InvalidInput(format!("Invalid metrics input: {reason}"))
}

/// Typed input already has string fields; only the score can be unusable.
fn validate(metrics: &QualityMetrics) -> Result<()> {
    if !metrics.overall_score.is_finite() {
        return Err(invalid("overall_score is not a finite number"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{FileDocument, MemoryDocument};
    use serde_json::json;
    use tempfile::TempDir;

    fn metrics(score: f64) -> QualityMetrics {
        QualityMetrics {
            mode: String::new(),
            gate_type: "general".to_string(),
            overall_score: score,
            passed: score >= 0.8,
            threshold: 0.8,
            check_count: 3,
            timestamp: "2026-10-15T12:00:00.000Z".to_string(),
        }
    }

    fn detector() -> (
        MemoryDocument,
        MemoryDocument,
        AnomalyDetector<MemoryDocument, MemoryDocument>,
    ) {
        let dashboard = MemoryDocument::new();
        let workflow = MemoryDocument::new();
        let d = AnomalyDetector::new(
            "qa",
            dashboard.clone(),
            WorkflowTaskWriter::new(workflow.clone()),
        );
        (dashboard, workflow, d)
    }

    fn indicators(doc: &MemoryDocument) -> Vec<Value> {
        let obj = document::read_object(doc);
        obj.get(INDICATORS_KEY)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn first_observation_is_not_an_anomaly() {
        let (dashboard, _, mut d) = detector();
        assert_eq!(d.detect(&metrics(0.2)).unwrap(), None);
        assert!(dashboard.contents().is_none());
        assert_eq!(d.baseline().len(), 1);
    }

    #[test]
    fn small_delta_is_not_an_anomaly() {
        let (dashboard, workflow, mut d) = detector();
        d.observe(&metrics(0.9));
        assert_eq!(d.detect(&metrics(0.85)).unwrap(), None);
        assert!(dashboard.contents().is_none());
        assert!(workflow.contents().is_none());
    }

    #[test]
    fn large_drop_files_indicator_and_task() {
        let (dashboard, _, mut d) = detector();
        d.observe(&metrics(0.9));
        let task_id = d.detect(&metrics(0.7)).unwrap().expect("anomaly");
        assert!(task_id.starts_with("task_"));

        let ind = indicators(&dashboard);
        assert_eq!(ind.len(), 1);
        assert_eq!(ind[0]["mode"], json!("qa"));
        assert_eq!(ind[0]["overall_score"], json!(0.7));

        let tasks = d.tasks().list_tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_id, task_id);
        assert_eq!(tasks[0].objective, ANOMALY_OBJECTIVE);
        assert_eq!(tasks[0].context["gate_type"], json!("general"));
    }

    #[test]
    fn delta_of_exactly_sensitivity_is_an_anomaly() {
        let (_, _, mut d) = detector();
        d.observe(&metrics(0.9));
        assert!(d.detect(&metrics(0.8)).unwrap().is_some());
    }

    #[test]
    fn improvements_count_too() {
        let (_, _, mut d) = detector();
        d.observe(&metrics(0.5));
        assert!(d.detect(&metrics(0.95)).unwrap().is_some());
    }

    #[test]
    fn comparison_is_against_the_previous_observation() {
        let (_, _, mut d) = detector();
        d.observe(&metrics(0.9));
        assert!(d.detect(&metrics(0.85)).unwrap().is_none());
        // 0.85 -> 0.78 is under the sensitivity even though 0.9 -> 0.78 is not.
        assert!(d.detect(&metrics(0.78)).unwrap().is_none());
    }

    #[test]
    fn keys_are_isolated_per_gate_type() {
        let (_, _, mut d) = detector();
        d.observe(&metrics(0.9));
        let mut other = metrics(0.1);
        other.gate_type = "security".to_string();
        assert!(d.detect(&other).unwrap().is_none());
    }

    #[test]
    fn malformed_json_input_is_rejected() {
        let (_, _, mut d) = detector();
        let err = d
            .detect_value(&json!({"gate_type": 1, "overall_score": "x"}))
            .unwrap_err();
        assert!(matches!(err, QgateError::InvalidInput(_)));
        assert!(err.to_string().contains("Invalid metrics input"));
        assert!(d.baseline().is_empty());
    }

    #[test]
    fn well_formed_json_input_is_accepted() {
        let (_, _, mut d) = detector();
        let input = json!({"gate_type": "general", "overall_score": 0.9, "timestamp": "t1"});
        assert_eq!(d.detect_value(&input).unwrap(), None);
        let input = json!({"gate_type": "general", "overall_score": 0.6, "timestamp": "t2"});
        assert!(d.detect_value(&input).unwrap().is_some());
    }

    #[test]
    fn typed_input_is_validated() {
        let (_, _, mut d) = detector();
        assert!(d.detect(&metrics(f64::NAN)).is_err());
        assert!(d.baseline().is_empty());
    }

    #[test]
    fn empty_strings_are_accepted() {
        let (_, _, mut d) = detector();
        let mut m = metrics(0.5);
        m.gate_type.clear();
        m.timestamp.clear();
        assert_eq!(d.detect(&m).unwrap(), None);
        let input = json!({"gate_type": "", "overall_score": 0.9, "timestamp": ""});
        assert!(d.detect_value(&input).unwrap().is_some());
    }

    /// Dashboard whose next `failures` writes fail.
    #[derive(Clone, Default)]
    struct FlakyDocument {
        inner: MemoryDocument,
        failures: std::rc::Rc<std::cell::Cell<u32>>,
    }

    impl DocumentStore for FlakyDocument {
        fn read(&self) -> Result<Option<String>> {
            self.inner.read()
        }

        fn write(&self, contents: &str) -> Result<()> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.write(contents)
        }

        fn describe(&self) -> String {
            "<flaky>".to_string()
        }
    }

    #[test]
    fn failed_escalation_is_retried() {
        let dashboard = FlakyDocument::default();
        dashboard.failures.set(1);
        let mut d = AnomalyDetector::new(
            "qa",
            dashboard.clone(),
            WorkflowTaskWriter::new(MemoryDocument::new()),
        );
        d.observe(&metrics(0.9));

        let err = d.detect(&metrics(0.7)).unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(d.baseline().get("qa", "general").unwrap().overall_score, 0.9);
        assert!(d.tasks().list_tasks().is_empty());

        let task_id = d.detect(&metrics(0.7)).unwrap().expect("anomaly on retry");
        assert_eq!(d.tasks().list_tasks()[0].task_id, task_id);
        assert_eq!(indicators(&dashboard.inner).len(), 1);
        assert_eq!(d.baseline().get("qa", "general").unwrap().overall_score, 0.7);
    }

    #[test]
    fn corrupt_dashboard_is_reset_and_other_fields_kept() {
        let dir = TempDir::new().unwrap();
        let dash_path = dir.path().join("quality-dashboard.json");
        std::fs::write(&dash_path, r#"{"project_phase": "dev", "predictive_quality_indicators": 5}"#)
            .unwrap();
        let mut d = AnomalyDetector::new(
            "qa",
            FileDocument::new(&dash_path),
            WorkflowTaskWriter::new(FileDocument::new(dir.path().join("workflow-state.json"))),
        );
        d.observe(&metrics(0.9));
        d.detect(&metrics(0.3)).unwrap().expect("anomaly");

        let doc: Value = serde_json::from_str(&std::fs::read_to_string(&dash_path).unwrap()).unwrap();
        assert_eq!(doc["project_phase"], json!("dev"));
        assert_eq!(doc[INDICATORS_KEY].as_array().unwrap().len(), 1);

        let wf: Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("workflow-state.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(wf["active_tasks"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn baseline_can_come_from_a_gate_table() {
        let mut table = MetricsTable::new();
        let mut seeded = metrics(0.95);
        seeded.mode = "qa".to_string();
        table.record(seeded);
        let (_, _, d) = detector();
        let mut d = d.with_baseline(table);
        assert!(d.detect(&metrics(0.5)).unwrap().is_some());
    }
}
