use crate::check::{Artifact, CheckRunner};
use crate::score::{mean_score, CheckResult, MetricsTable, QualityMetrics};
use crate::threshold::ThresholdResolver;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

pub const QUALITY_GATE_ERROR: &str = "QualityGateError";

// ---------------------------------------------------------------------------
// GateReport
// ---------------------------------------------------------------------------

/// Result of [`QualityGate::run`]. Malformed input is reported here as a
/// failed gate rather than as an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GateReport {
    Evaluated {
        #[serde(flatten)]
        metrics: QualityMetrics,
        checks: Vec<CheckResult>,
    },
    Rejected {
        passed: bool,
        error_type: String,
        message: String,
    },
}

impl GateReport {
    fn rejected(message: impl Into<String>) -> Self {
        GateReport::Rejected {
            passed: false,
            error_type: QUALITY_GATE_ERROR.to_string(),
            message: message.into(),
        }
    }

    pub fn passed(&self) -> bool {
        match self {
            GateReport::Evaluated { metrics, .. } => metrics.passed,
            GateReport::Rejected { .. } => false,
        }
    }

    pub fn metrics(&self) -> Option<&QualityMetrics> {
        match self {
            GateReport::Evaluated { metrics, .. } => Some(metrics),
            GateReport::Rejected { .. } => None,
        }
    }

    pub fn error_type(&self) -> Option<&str> {
        match self {
            GateReport::Evaluated { .. } => None,
            GateReport::Rejected { error_type, .. } => Some(error_type),
        }
    }
}

// ---------------------------------------------------------------------------
// QualityGate
// ---------------------------------------------------------------------------

pub struct QualityGate<R> {
    mode: String,
    runner: R,
    thresholds: ThresholdResolver,
    metrics: MetricsTable,
}

impl<R: CheckRunner> QualityGate<R> {
    pub fn new(mode: impl Into<String>, runner: R, thresholds: ThresholdResolver) -> Self {
        Self {
            mode: mode.into(),
            runner,
            thresholds,
            metrics: MetricsTable::new(),
        }
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Latest metrics per `"{mode}_{gate_type}"`.
    pub fn metrics(&self) -> &MetricsTable {
        &self.metrics
    }

    /// Entry point for gate types that arrive as untyped JSON.
    pub fn run_value(&mut self, artifact: &Artifact, gate_type: &Value) -> GateReport {
        match gate_type {
            Value::String(s) => self.run(artifact, s),
            other => GateReport::rejected(format!("gate type must be a string, got {other}")),
        }
    }

    /// Any string is a gate type. Names that cannot map to a rule file
    /// resolve their threshold from config or the default.
    pub fn run(&mut self, artifact: &Artifact, gate_type: &str) -> GateReport {
        let checks = self.runner.run_checks(artifact, gate_type);
        let overall_score = mean_score(&checks);
        let threshold = self.thresholds.resolve(gate_type);
        let passed = checks.iter().all(|c| c.passed) && overall_score >= threshold;

        let metrics = QualityMetrics {
            mode: self.mode.clone(),
            gate_type: gate_type.to_string(),
            overall_score,
            passed,
            threshold,
            check_count: checks.len(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        tracing::debug!(
            mode = %self.mode,
            gate = gate_type,
            score = overall_score,
            threshold,
            passed,
            "quality gate evaluated"
        );
        self.metrics.record(metrics.clone());

        GateReport::Evaluated { metrics, checks }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixed(scores: &'static [(bool, f64)]) -> impl Fn(&Artifact, &str) -> Vec<CheckResult> {
        move |_: &Artifact, _: &str| {
            scores
                .iter()
                .enumerate()
                .map(|(i, &(passed, score))| CheckResult::new(format!("c{i}"), passed, score))
                .collect()
        }
    }

    fn artifact() -> Artifact {
        Artifact::inline("doc", "# Title\n")
    }

    #[test]
    fn all_passing_above_default_threshold_passes() {
        let mut gate = QualityGate::new(
            "qa",
            fixed(&[(true, 1.0), (true, 0.8)]),
            ThresholdResolver::default(),
        );
        let report = gate.run(&artifact(), "general");
        assert!(report.passed());
        let m = report.metrics().unwrap();
        assert_eq!(m.overall_score, 0.9);
        assert_eq!(m.threshold, 0.8);
        assert_eq!(m.check_count, 2);
        assert_eq!(m.mode, "qa");
    }

    #[test]
    fn average_below_threshold_fails() {
        let mut gate = QualityGate::new(
            "qa",
            fixed(&[(true, 0.7), (true, 0.7)]),
            ThresholdResolver::default(),
        );
        let report = gate.run(&artifact(), "general");
        assert!(!report.passed());
        assert_eq!(report.metrics().unwrap().overall_score, 0.7);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let mut gate = QualityGate::new(
            "qa",
            fixed(&[(true, 0.9), (true, 0.7)]),
            ThresholdResolver::default(),
        );
        let report = gate.run(&artifact(), "general");
        assert_eq!(report.metrics().unwrap().overall_score, 0.8);
        assert!(report.passed());
    }

    #[test]
    fn any_failed_check_fails_the_gate() {
        let mut gate = QualityGate::new(
            "qa",
            fixed(&[(true, 1.0), (false, 1.0)]),
            ThresholdResolver::default(),
        );
        assert!(!gate.run(&artifact(), "general").passed());
    }

    #[test]
    fn zero_checks_scores_zero() {
        let mut gate = QualityGate::new("qa", fixed(&[]), ThresholdResolver::default());
        let report = gate.run(&artifact(), "general");
        let m = report.metrics().unwrap();
        assert_eq!(m.overall_score, 0.0);
        assert_eq!(m.check_count, 0);
        assert!(!m.passed);
    }

    #[test]
    fn non_string_gate_type_is_reported_not_thrown() {
        let mut gate = QualityGate::new("qa", fixed(&[(true, 1.0)]), ThresholdResolver::default());
        let report = gate.run_value(&artifact(), &json!(123));
        assert!(!report.passed());
        assert_eq!(report.error_type(), Some("QualityGateError"));
        assert!(gate.metrics().is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["passed"], json!(false));
        assert_eq!(json["error_type"], json!("QualityGateError"));
    }

    #[test]
    fn any_string_gate_type_is_evaluated() {
        let mut gate = QualityGate::new("qa", fixed(&[(true, 1.0)]), ThresholdResolver::default());
        for gate_type in ["code review", "", "../x"] {
            let report = gate.run(&artifact(), gate_type);
            assert_eq!(report.error_type(), None, "gate type {gate_type:?}");
            assert!(report.passed());
            assert_eq!(report.metrics().unwrap().threshold, 0.8);
        }
        assert!(gate.metrics().get("qa", "code review").is_some());
    }

    #[test]
    fn unsafe_gate_type_skips_rule_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let rules = dir.path().join("rules");
        std::fs::create_dir_all(&rules).unwrap();
        std::fs::write(dir.path().join("escape.json"), r#"{"threshold": 0.1}"#).unwrap();
        let mut gate = QualityGate::new(
            "qa",
            fixed(&[(true, 0.5)]),
            ThresholdResolver::new(Some(rules), None),
        );
        let report = gate.run(&artifact(), "../escape");
        assert_eq!(report.metrics().unwrap().threshold, 0.8);
        assert!(!report.passed());
    }

    #[test]
    fn string_value_gate_type_is_evaluated() {
        let mut gate = QualityGate::new("qa", fixed(&[(true, 1.0)]), ThresholdResolver::default());
        assert!(gate.run_value(&artifact(), &json!("general")).passed());
    }

    #[test]
    fn metrics_overwrite_per_key() {
        let mut gate = QualityGate::new("qa", fixed(&[(true, 1.0)]), ThresholdResolver::default());
        gate.run(&artifact(), "general");
        gate.run(&artifact(), "general");
        gate.run(&artifact(), "security");
        assert_eq!(gate.metrics().len(), 2);
        assert!(gate.metrics().get("qa", "general").is_some());
    }

    #[test]
    fn evaluated_report_serializes_flat() {
        let mut gate = QualityGate::new("qa", fixed(&[(true, 1.0)]), ThresholdResolver::default());
        let json = serde_json::to_value(gate.run(&artifact(), "general")).unwrap();
        assert_eq!(json["gate_type"], json!("general"));
        assert_eq!(json["passed"], json!(true));
        assert_eq!(json["checks"].as_array().unwrap().len(), 1);
        assert!(json.get("error_type").is_none());
    }

    #[test]
    fn runner_receives_gate_type() {
        let runner = |_: &Artifact, gate: &str| vec![CheckResult::new(gate, true, 1.0)];
        let mut gate = QualityGate::new("qa", runner, ThresholdResolver::default());
        match gate.run(&artifact(), "api_documentation") {
            GateReport::Evaluated { checks, .. } => assert_eq!(checks[0].check, "api_documentation"),
            other => panic!("unexpected report: {other:?}"),
        }
    }
}
