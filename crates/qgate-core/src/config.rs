use crate::check::{CheckDefinition, CheckKind};
use crate::error::{QgateError, Result};
use crate::learning::{DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS};
use crate::paths;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// QualityGateConfig
// ---------------------------------------------------------------------------

/// `qualityGate:` section. Read directly by the threshold resolver as well,
/// so the key names are fixed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityGateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub thresholds: HashMap<String, f64>,
}

// ---------------------------------------------------------------------------
// LearningConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            retries: default_retries(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default, rename = "qualityGate")]
    pub quality_gate: QualityGateConfig,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub checks: HashMap<String, Vec<CheckDefinition>>,
    #[serde(default)]
    pub learning: LearningConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        let mut checks = HashMap::new();
        checks.insert(
            "general".to_string(),
            vec![CheckDefinition {
                name: "non_empty".to_string(),
                check_type: CheckKind::MinLength { chars: 1 },
                timeout_seconds: 60,
            }],
        );
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            quality_gate: QualityGateConfig::default(),
            checks,
            learning: LearningConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(QgateError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. Thresholds must be usable by the resolver
        if let Some(t) = self.quality_gate.default {
            if !(0.0..=1.0).contains(&t) {
                warnings.push(error(format!(
                    "qualityGate.default={t} is outside [0, 1] and will be ignored"
                )));
            }
        }
        for (gate, t) in &self.quality_gate.thresholds {
            if !paths::is_valid_gate_type(gate) {
                warnings.push(warning(format!(
                    "invalid gate type '{gate}' in qualityGate.thresholds"
                )));
            }
            if !(0.0..=1.0).contains(t) {
                warnings.push(error(format!(
                    "qualityGate.thresholds.{gate}={t} is outside [0, 1] and will be ignored"
                )));
            }
        }

        // 2. Check definitions
        for (gate, defs) in &self.checks {
            if !paths::is_valid_gate_type(gate) {
                warnings.push(warning(format!("invalid gate type '{gate}' in checks")));
            }
            for def in defs {
                match &def.check_type {
                    CheckKind::Shell { command } if command.trim().is_empty() => {
                        warnings.push(warning(format!(
                            "check '{}' on gate '{gate}' has an empty command",
                            def.name
                        )));
                    }
                    CheckKind::Pattern { regex } => {
                        if let Err(e) = Regex::new(regex) {
                            warnings.push(error(format!(
                                "check '{}' on gate '{gate}' has an invalid regex: {e}",
                                def.name
                            )));
                        }
                    }
                    _ => {}
                }
            }
        }

        // 3. Learning client
        if self.learning.retries == 0 {
            warnings.push(warning(
                "learning.retries=0; the client always makes at least one attempt".to_string(),
            ));
        }
        if self.learning.timeout_ms == 0 {
            warnings.push(error(
                "learning.timeout_ms=0; every guidance request would time out".to_string(),
            ));
        }

        warnings
    }
}

fn warning(message: String) -> ConfigWarning {
    ConfigWarning {
        level: WarnLevel::Warning,
        message,
    }
}

fn error(message: String) -> ConfigWarning {
    ConfigWarning {
        level: WarnLevel::Error,
        message,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
