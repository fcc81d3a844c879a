//! Phase-aware threshold orchestration over the quality dashboard.
//!
//! Unlike the anomaly indicators, the threshold fields of the dashboard are
//! a source of truth: a missing or incomplete document is an error here.
//! Writes preserve every other field of the document.

use crate::document::{self, DocumentStore};
use crate::error::{QgateError, Result};
use crate::score::{round_to, SCORE_PRECISION};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Threshold reported for a gate the dashboard does not know.
pub const UNKNOWN_GATE_THRESHOLD: f64 = 0.7;
pub const ADJUSTMENT_STEP: f64 = 0.001;
/// Bound applied by a single feedback step.
pub const ADJUSTMENT_STEP_LIMIT: f64 = 0.1;
/// Absolute bound on any stored adjustment.
pub const ADJUSTMENT_LIMIT: f64 = 0.2;

const REQUIRED_FIELDS: [&str; 3] = ["project_phase", "gate_thresholds", "learning_adjustments"];

// ---------------------------------------------------------------------------
// ProjectPhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPhase {
    Init,
    Dev,
    Stabilization,
    Release,
}

impl ProjectPhase {
    pub const ALL: [ProjectPhase; 4] = [
        ProjectPhase::Init,
        ProjectPhase::Dev,
        ProjectPhase::Stabilization,
        ProjectPhase::Release,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectPhase::Init => "init",
            ProjectPhase::Dev => "dev",
            ProjectPhase::Stabilization => "stabilization",
            ProjectPhase::Release => "release",
        }
    }

    /// Scale applied to a gate's base threshold on entering this phase.
    /// Gates without their own entry use the phase's `general` multiplier.
    pub fn multiplier(self, gate_type: &str) -> f64 {
        use ProjectPhase::*;
        match (self, gate_type) {
            (Init, "security") => 0.7,
            (Init, "performance") => 0.6,
            (Init, "code") => 0.8,
            (Init, "architecture") => 0.5,
            (Init, "api_documentation") => 0.6,
            (Init, "code_documentation") => 0.7,
            (Init, "architecture_documentation") => 0.4,
            (Init, "usage_documentation") => 0.8,
            (Init, _) => 0.7,

            (Dev, "security") => 0.8,
            (Dev, "performance") => 0.7,
            (Dev, "code") => 0.9,
            (Dev, "architecture") => 0.7,
            (Dev, "api_documentation") => 0.7,
            (Dev, "code_documentation") => 0.8,
            (Dev, "architecture_documentation") => 0.6,
            (Dev, "usage_documentation") => 0.9,
            (Dev, _) => 0.8,

            (Stabilization, "security") => 1.0,
            (Stabilization, "performance") => 0.9,
            (Stabilization, "code") => 1.0,
            (Stabilization, "architecture") => 0.9,
            (Stabilization, "api_documentation") => 0.9,
            (Stabilization, "code_documentation") => 1.0,
            (Stabilization, "architecture_documentation") => 0.8,
            (Stabilization, "usage_documentation") => 1.0,
            (Stabilization, _) => 0.9,

            (Release, "security") => 1.1,
            (Release, _) => 1.0,
        }
    }
}

impl fmt::Display for ProjectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectPhase {
    type Err = QgateError;

    fn from_str(s: &str) -> Result<Self> {
        ProjectPhase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| QgateError::InvalidPhase(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ThresholdConfig / feedback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub project_phase: String,
    pub gate_thresholds: BTreeMap<String, f64>,
    pub learning_adjustments: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl ThresholdConfig {
    /// Starting point written by `qgate init`.
    pub fn baseline() -> Self {
        let gate_thresholds: BTreeMap<String, f64> = [
            ("security", 0.8),
            ("performance", 0.75),
            ("code", 0.7),
            ("architecture", 0.8),
            ("general", 0.7),
            ("api_documentation", 0.75),
            ("code_documentation", 0.7),
            ("architecture_documentation", 0.8),
            ("usage_documentation", 0.7),
        ]
        .into_iter()
        .map(|(g, t)| (g.to_string(), t))
        .collect();
        let learning_adjustments = gate_thresholds.keys().map(|g| (g.clone(), 0.0)).collect();
        Self {
            project_phase: ProjectPhase::Dev.to_string(),
            gate_thresholds,
            learning_adjustments,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateFeedback {
    pub success_rate: f64,
}

/// Observed pass rates per gate type.
pub type Feedback = BTreeMap<String, GateFeedback>;

/// True when `input` is an object of `{"success_rate": 0..=1}` objects.
pub fn validate_feedback(input: &Value) -> bool {
    let Some(gates) = input.as_object() else {
        return false;
    };
    gates.values().all(|metrics| {
        metrics
            .get("success_rate")
            .and_then(Value::as_f64)
            .is_some_and(|r| (0.0..=1.0).contains(&r))
    })
}

pub fn parse_feedback(input: &Value) -> Result<Feedback> {
    if !validate_feedback(input) {
        return Err(QgateError::InvalidInput(
            "Invalid feedback: expected {\"<gate>\": {\"success_rate\": 0..1}, ...}".to_string(),
        ));
    }
    Ok(serde_json::from_value(input.clone())?)
}

fn apply_feedback(adjustments: &mut BTreeMap<String, f64>, feedback: &Feedback) {
    for (gate, metrics) in feedback {
        let adj = adjustments.entry(gate.clone()).or_insert(0.0);
        if metrics.success_rate > 0.9 {
            *adj = (*adj + ADJUSTMENT_STEP).min(ADJUSTMENT_STEP_LIMIT);
        } else if metrics.success_rate < 0.7 {
            *adj = (*adj - ADJUSTMENT_STEP).max(-ADJUSTMENT_STEP_LIMIT);
        }
        *adj = round_to(adj.clamp(-ADJUSTMENT_LIMIT, ADJUSTMENT_LIMIT), SCORE_PRECISION);
    }
}

fn unit(value: f64) -> f64 {
    round_to(value.clamp(0.0, 1.0), SCORE_PRECISION)
}

// ---------------------------------------------------------------------------
// PhaseOrchestrator
// ---------------------------------------------------------------------------

pub struct PhaseOrchestrator<D> {
    dashboard: D,
}

impl<D: DocumentStore> PhaseOrchestrator<D> {
    pub fn new(dashboard: D) -> Self {
        Self { dashboard }
    }

    pub fn read_current_config(&self) -> Result<ThresholdConfig> {
        let raw = self.dashboard.read()?.ok_or_else(|| {
            QgateError::Orchestrator(format!(
                "dashboard {} does not exist",
                self.dashboard.describe()
            ))
        })?;
        let doc: Map<String, Value> = serde_json::from_str(&raw).map_err(|e| {
            QgateError::Orchestrator(format!(
                "dashboard {} is not a JSON object: {e}",
                self.dashboard.describe()
            ))
        })?;
        if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !doc.contains_key(**f)) {
            return Err(QgateError::Orchestrator(format!(
                "missing {missing} in dashboard {}",
                self.dashboard.describe()
            )));
        }
        serde_json::from_value(Value::Object(doc)).map_err(|e| {
            QgateError::Orchestrator(format!("malformed threshold fields: {e}"))
        })
    }

    /// Merge the threshold fields into the dashboard and stamp `updated_at`.
    /// Returns the config as written.
    pub fn write_config(&self, config: &ThresholdConfig) -> Result<ThresholdConfig> {
        let written = ThresholdConfig {
            updated_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            ..config.clone()
        };
        let mut doc = document::read_object(&self.dashboard);
        if let Value::Object(fields) = serde_json::to_value(&written)? {
            doc.extend(fields);
        }
        document::write_object(&self.dashboard, &doc)?;
        tracing::info!(
            phase = %written.project_phase,
            "updated quality thresholds in {}",
            self.dashboard.describe()
        );
        Ok(written)
    }

    pub fn handle_phase_transition(
        &self,
        phase: ProjectPhase,
        feedback: Option<&Feedback>,
    ) -> Result<ThresholdConfig> {
        let current = self.read_current_config()?;
        let gate_thresholds = current
            .gate_thresholds
            .iter()
            .map(|(gate, base)| (gate.clone(), unit(base * phase.multiplier(gate))))
            .collect();
        let mut learning_adjustments = current.learning_adjustments.clone();
        if let Some(feedback) = feedback {
            apply_feedback(&mut learning_adjustments, feedback);
        }

        let updated = self.write_config(&ThresholdConfig {
            project_phase: phase.to_string(),
            gate_thresholds,
            learning_adjustments,
            updated_at: None,
        })?;
        tracing::info!("phase transition {} -> {phase}", current.project_phase);
        Ok(updated)
    }

    pub fn update_learning_adjustments(&self, feedback: &Feedback) -> Result<ThresholdConfig> {
        let mut config = self.read_current_config()?;
        apply_feedback(&mut config.learning_adjustments, feedback);
        self.write_config(&config)
    }

    /// `clamp(base + adjustment, 0, 1)` for every gate, or for `gate_type`
    /// alone when given.
    pub fn effective_thresholds(&self, gate_type: Option<&str>) -> Result<BTreeMap<String, f64>> {
        let config = self.read_current_config()?;
        let mut effective: BTreeMap<String, f64> = config
            .gate_thresholds
            .iter()
            .map(|(gate, base)| {
                let adj = config.learning_adjustments.get(gate).copied().unwrap_or(0.0);
                (gate.clone(), unit(base + adj))
            })
            .collect();

        match gate_type {
            Some(gate) => {
                let value = effective.remove(gate).unwrap_or(UNKNOWN_GATE_THRESHOLD);
                Ok(BTreeMap::from([(gate.to_string(), value)]))
            }
            None => Ok(effective),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
