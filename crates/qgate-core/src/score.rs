use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decimal places kept on reported scores.
pub const SCORE_PRECISION: i32 = 6;

// ---------------------------------------------------------------------------
// CheckResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: String,
    pub passed: bool,
    /// Score from 0.0 to 1.0.
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    pub fn new(check: impl Into<String>, passed: bool, score: f64) -> Self {
        Self {
            check: check.into(),
            passed,
            score,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ---------------------------------------------------------------------------
// QualityMetrics
// ---------------------------------------------------------------------------

/// Outcome of one quality-gate evaluation.
///
/// Only `gate_type`, `overall_score` and `timestamp` are required when the
/// record arrives as JSON from outside; the rest default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    #[serde(default)]
    pub mode: String,
    pub gate_type: String,
    pub overall_score: f64,
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub check_count: usize,
    pub timestamp: String,
}

impl QualityMetrics {
    pub fn key(&self) -> String {
        metrics_key(&self.mode, &self.gate_type)
    }
}

pub fn metrics_key(mode: &str, gate_type: &str) -> String {
    format!("{mode}_{gate_type}")
}

// ---------------------------------------------------------------------------
// MetricsTable
// ---------------------------------------------------------------------------

/// Most recent metrics per `"{mode}_{gate_type}"` key. Overwrite semantics,
/// no history.
#[derive(Debug, Clone, Default)]
pub struct MetricsTable {
    entries: HashMap<String, QualityMetrics>,
}

impl MetricsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `metrics` under its key, returning the record it displaced.
    pub fn record(&mut self, metrics: QualityMetrics) -> Option<QualityMetrics> {
        self.entries.insert(metrics.key(), metrics)
    }

    pub fn get(&self, mode: &str, gate_type: &str) -> Option<&QualityMetrics> {
        self.entries.get(&metrics_key(mode, gate_type))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QualityMetrics> {
        self.entries.values()
    }
}

// ---------------------------------------------------------------------------
// Numeric helpers
// ---------------------------------------------------------------------------

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Arithmetic mean with an empty input counting as one zero-valued sample.
pub fn mean_score(results: &[CheckResult]) -> f64 {
    let total: f64 = results.iter().map(|r| r.score).sum();
    let denominator = results.len().max(1) as f64;
    round_to(total / denominator, SCORE_PRECISION)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
