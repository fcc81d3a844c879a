use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const QGATE_DIR: &str = ".qgate";
pub const RULES_DIR: &str = ".qgate/rules";
pub const CONTROL_DIR: &str = ".qgate/control";

pub const CONFIG_FILE: &str = ".qgate/config.yaml";
pub const PATTERNS_FILE: &str = ".qgate/patterns.json";
pub const DECISION_LOG_FILE: &str = ".qgate/decision-log.md";
pub const WORKFLOW_STATE_FILE: &str = ".qgate/control/workflow-state.json";
pub const DASHBOARD_FILE: &str = ".qgate/control/quality-dashboard.json";

/// Environment variables that relocate the control documents.
pub const WORKFLOW_STATE_ENV: &str = "WORKFLOW_STATE_PATH";
pub const DASHBOARD_ENV: &str = "QUALITY_DASHBOARD_PATH";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn qgate_dir(root: &Path) -> PathBuf {
    root.join(QGATE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn patterns_path(root: &Path) -> PathBuf {
    root.join(PATTERNS_FILE)
}

pub fn rules_dir(root: &Path) -> PathBuf {
    root.join(RULES_DIR)
}

pub fn rule_path(rules_dir: &Path, gate_type: &str) -> PathBuf {
    rules_dir.join(format!("{gate_type}.json"))
}

pub fn decision_log_path(root: &Path) -> PathBuf {
    root.join(DECISION_LOG_FILE)
}

/// Workflow-state document: explicit override first, then the default under `root`.
/// Relative overrides are resolved against `root`.
pub fn workflow_state_path(root: &Path, explicit: Option<&Path>) -> PathBuf {
    resolve_override(root, explicit, WORKFLOW_STATE_FILE)
}

pub fn dashboard_path(root: &Path, explicit: Option<&Path>) -> PathBuf {
    resolve_override(root, explicit, DASHBOARD_FILE)
}

fn resolve_override(root: &Path, explicit: Option<&Path>, default: &str) -> PathBuf {
    match explicit {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => root.join(p),
        None => root.join(default),
    }
}

// ---------------------------------------------------------------------------
// Gate type validation
// ---------------------------------------------------------------------------

static GATE_TYPE_RE: OnceLock<Regex> = OnceLock::new();

fn gate_type_re() -> &'static Regex {
    GATE_TYPE_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("static regex"))
}

/// Gate types name rule files on disk, so they are restricted to a safe charset.
pub fn is_valid_gate_type(gate_type: &str) -> bool {
    !gate_type.is_empty() && gate_type.len() <= 64 && gate_type_re().is_match(gate_type)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
