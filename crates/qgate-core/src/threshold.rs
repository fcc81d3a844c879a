//! Pass-threshold lookup for a gate type.
//!
//! Sources, first usable value wins:
//!   1. `<rules_dir>/<gate_type>.json`           : `{"threshold": 0.85}`
//!   2. project config `qualityGate.thresholds.<gate_type>`
//!   3. project config `qualityGate.default`
//!   4. [`DEFAULT_THRESHOLD`]
//!
//! Both files are read on every lookup so edits take effect without a restart.

use crate::io;
use crate::paths;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const DEFAULT_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Default)]
pub struct ThresholdResolver {
    rules_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl ThresholdResolver {
    pub fn new(rules_dir: Option<PathBuf>, config_path: Option<PathBuf>) -> Self {
        Self {
            rules_dir,
            config_path,
        }
    }

    /// Resolver over the standard `.qgate/` layout under `root`.
    pub fn for_root(root: &Path) -> Self {
        Self::new(Some(paths::rules_dir(root)), Some(paths::config_path(root)))
    }

    pub fn resolve(&self, gate_type: &str) -> f64 {
        if let Some(t) = self.from_rule_file(gate_type) {
            return t;
        }
        if let Some(t) = self.from_config(gate_type) {
            return t;
        }
        DEFAULT_THRESHOLD
    }

    fn from_rule_file(&self, gate_type: &str) -> Option<f64> {
        let dir = self.rules_dir.as_ref()?;
        if !paths::is_valid_gate_type(gate_type) {
            return None;
        }
        let path = paths::rule_path(dir, gate_type);
        let raw = read_quietly(&path)?;
        let value: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("ignoring unparseable rule file {}: {e}", path.display());
                return None;
            }
        };
        checked(value.get("threshold")?.as_f64(), &path, "threshold")
    }

    fn from_config(&self, gate_type: &str) -> Option<f64> {
        let path = self.config_path.as_ref()?;
        let raw = read_quietly(path)?;
        let doc: serde_yaml::Value = match serde_yaml::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("ignoring unparseable config {}: {e}", path.display());
                return None;
            }
        };
        let section = doc.get("qualityGate")?;
        let per_gate = section
            .get("thresholds")
            .and_then(|t| t.get(gate_type))
            .and_then(|v| checked(v.as_f64(), path, gate_type));
        per_gate.or_else(|| {
            section
                .get("default")
                .and_then(|v| checked(v.as_f64(), path, "default"))
        })
    }
}

fn read_quietly(path: &Path) -> Option<String> {
    match io::read_optional(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!("could not read {}: {e}", path.display());
            None
        }
    }
}

fn checked(value: Option<f64>, path: &Path, field: &str) -> Option<f64> {
    match value {
        Some(t) if (0.0..=1.0).contains(&t) => Some(t),
        Some(t) => {
            tracing::warn!("ignoring threshold '{field}'={t} in {}: outside [0, 1]", path.display());
            None
        }
        None => {
            tracing::warn!("ignoring non-numeric threshold '{field}' in {}", path.display());
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(rule: Option<(&str, &str)>, config: Option<&str>) -> (TempDir, ThresholdResolver) {
        let dir = TempDir::new().unwrap();
        if let Some((gate, body)) = rule {
            let rules = paths::rules_dir(dir.path());
            std::fs::create_dir_all(&rules).unwrap();
            std::fs::write(paths::rule_path(&rules, gate), body).unwrap();
        }
        if let Some(body) = config {
            let path = paths::config_path(dir.path());
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        let resolver = ThresholdResolver::for_root(dir.path());
        (dir, resolver)
    }

    #[test]
    fn defaults_when_nothing_configured() {
        let (_dir, r) = setup(None, None);
        assert_eq!(r.resolve("general"), DEFAULT_THRESHOLD);
        assert_eq!(ThresholdResolver::default().resolve("general"), 0.8);
    }

    #[test]
    fn rule_file_wins_over_config() {
        let config = "qualityGate:\n  default: 0.6\n  thresholds:\n    general: 0.7\n";
        let (_dir, r) = setup(Some(("general", r#"{"threshold": 0.9}"#)), Some(config));
        assert_eq!(r.resolve("general"), 0.9);
    }

    #[test]
    fn config_per_gate_then_default() {
        let config = "qualityGate:\n  default: 0.6\n  thresholds:\n    api_documentation: 0.85\n";
        let (_dir, r) = setup(None, Some(config));
        assert_eq!(r.resolve("api_documentation"), 0.85);
        assert_eq!(r.resolve("general"), 0.6);
    }

    #[test]
    fn corrupt_rule_file_falls_through() {
        let config = "qualityGate:\n  thresholds:\n    general: 0.75\n";
        let (_dir, r) = setup(Some(("general", "{oops")), Some(config));
        assert_eq!(r.resolve("general"), 0.75);
    }

    #[test]
    fn out_of_range_and_non_numeric_values_are_ignored() {
        let config = "qualityGate:\n  default: nope\n  thresholds:\n    general: 1.5\n";
        let (_dir, r) = setup(Some(("general", r#"{"threshold": "high"}"#)), Some(config));
        assert_eq!(r.resolve("general"), DEFAULT_THRESHOLD);
    }

    #[test]
    fn unparseable_config_falls_back_to_default() {
        let (_dir, r) = setup(None, Some("qualityGate: [unclosed"));
        assert_eq!(r.resolve("general"), DEFAULT_THRESHOLD);
    }

    #[test]
    fn unsafe_gate_type_never_touches_rule_files() {
        let (_dir, r) = setup(None, None);
        assert_eq!(r.resolve("../../etc/passwd"), DEFAULT_THRESHOLD);
    }
}
