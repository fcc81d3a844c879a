use crate::error::Result;
use crate::score::CheckResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Environment variable carrying the artifact path into shell checks.
pub const ARTIFACT_ENV: &str = "QGATE_ARTIFACT";

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// The thing a quality gate evaluates.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub path: Option<PathBuf>,
    pub content: String,
}

impl Artifact {
    pub fn inline(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            content: content.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self {
            name: path.display().to_string(),
            path: Some(path.to_path_buf()),
            content,
        })
    }
}

// ---------------------------------------------------------------------------
// CheckKind / CheckDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckKind {
    Shell { command: String },
    Pattern { regex: String },
    Sections { headings: Vec<String> },
    MinLength { chars: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckDefinition {
    pub name: String,
    pub check_type: CheckKind,
    /// Only used by shell checks. `0` means no timeout.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
}

fn default_timeout() -> u32 {
    60
}

// ---------------------------------------------------------------------------
// CheckRunner
// ---------------------------------------------------------------------------

/// Produces the individual check results for one gate evaluation.
pub trait CheckRunner {
    fn run_checks(&self, artifact: &Artifact, gate_type: &str) -> Vec<CheckResult>;
}

impl<F> CheckRunner for F
where
    F: Fn(&Artifact, &str) -> Vec<CheckResult>,
{
    fn run_checks(&self, artifact: &Artifact, gate_type: &str) -> Vec<CheckResult> {
        self(artifact, gate_type)
    }
}

/// Runs the checks declared under `checks.<gate_type>` in the project config.
#[derive(Debug, Clone)]
pub struct ConfiguredCheckRunner {
    root: PathBuf,
    checks: HashMap<String, Vec<CheckDefinition>>,
}

impl ConfiguredCheckRunner {
    pub fn new(root: impl Into<PathBuf>, checks: HashMap<String, Vec<CheckDefinition>>) -> Self {
        Self {
            root: root.into(),
            checks,
        }
    }

    pub fn checks_for(&self, gate_type: &str) -> &[CheckDefinition] {
        self.checks
            .get(gate_type)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

impl CheckRunner for ConfiguredCheckRunner {
    fn run_checks(&self, artifact: &Artifact, gate_type: &str) -> Vec<CheckResult> {
        let defs = self.checks_for(gate_type);
        if defs.is_empty() {
            tracing::debug!("no checks configured for gate '{gate_type}'");
        }
        defs.iter()
            .map(|def| run_check(def, artifact, &self.root))
            .collect()
    }
}

pub fn run_check(def: &CheckDefinition, artifact: &Artifact, root: &Path) -> CheckResult {
    match &def.check_type {
        CheckKind::Shell { command } => {
            if command.trim().is_empty() {
                return CheckResult::new(&def.name, false, 0.0).with_detail("check command is empty");
            }
            let timeout = if def.timeout_seconds == 0 {
                None
            } else {
                Some(Duration::from_secs(def.timeout_seconds as u64))
            };
            let (passed, output) = execute_shell(command, root, artifact.path.as_deref(), timeout);
            let score = if passed { 1.0 } else { 0.0 };
            let result = CheckResult::new(&def.name, passed, score);
            if output.is_empty() {
                result
            } else {
                result.with_detail(output)
            }
        }
        CheckKind::Pattern { regex } => match Regex::new(regex) {
            Ok(re) => {
                let matched = re.is_match(&artifact.content);
                CheckResult::new(&def.name, matched, if matched { 1.0 } else { 0.0 })
            }
            Err(e) => CheckResult::new(&def.name, false, 0.0).with_detail(format!("invalid regex: {e}")),
        },
        CheckKind::Sections { headings } => {
            if headings.is_empty() {
                return CheckResult::new(&def.name, true, 1.0);
            }
            let present: Vec<&str> = artifact
                .content
                .lines()
                .filter_map(heading_text)
                .collect();
            let missing: Vec<&String> = headings
                .iter()
                .filter(|h| !present.iter().any(|p| p.eq_ignore_ascii_case(h.trim())))
                .collect();
            let found = headings.len() - missing.len();
            let score = found as f64 / headings.len() as f64;
            let result = CheckResult::new(&def.name, missing.is_empty(), score);
            if missing.is_empty() {
                result
            } else {
                let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
                result.with_detail(format!("missing sections: {}", names.join(", ")))
            }
        }
        CheckKind::MinLength { chars } => {
            let len = artifact.content.chars().count();
            if *chars == 0 {
                return CheckResult::new(&def.name, true, 1.0);
            }
            let score = (len as f64 / *chars as f64).min(1.0);
            CheckResult::new(&def.name, len >= *chars, score)
                .with_detail(format!("{len}/{chars} chars"))
        }
    }
}

/// Text of a markdown ATX heading line (`## Usage` → `Usage`).
fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let rest = trimmed.trim_start_matches('#');
    let level = trimmed.len() - rest.len();
    if level == 0 || level > 6 || !(rest.is_empty() || rest.starts_with(' ')) {
        return None;
    }
    Some(rest.trim().trim_end_matches('#').trim())
}

// ---------------------------------------------------------------------------
// Shell execution
// ---------------------------------------------------------------------------

/// Execute a shell command with an optional timeout. Returns (success, combined output).
///
/// The command runs in its own process group. Once the shell exits, or the
/// timeout fires, the whole group is killed so background children cannot
/// hold the output pipes open. `None` waits indefinitely.
fn execute_shell(
    command: &str,
    cwd: &Path,
    artifact: Option<&Path>,
    timeout: Option<Duration>,
) -> (bool, String) {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(path) = artifact {
        cmd.env(ARTIFACT_ENV, path);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return (false, format!("failed to spawn: {e}")),
    };

    let child_pid = child.id();
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || -> String {
        let mut buf = String::new();
        if let Some(mut r) = stdout_handle {
            use std::io::Read;
            let _ = r.read_to_string(&mut buf);
        }
        buf
    });
    let stderr_thread = std::thread::spawn(move || -> String {
        let mut buf = String::new();
        if let Some(mut r) = stderr_handle {
            use std::io::Read;
            let _ = r.read_to_string(&mut buf);
        }
        buf
    });

    let wait_result = match timeout {
        None => child.wait(),
        Some(timeout_dur) => {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = tx.send(child.wait());
            });

            match rx.recv_timeout(timeout_dur) {
                Ok(result) => result,
                Err(_) => {
                    kill_process_group(child_pid);
                    let millis = timeout_dur.as_millis();
                    return (false, format!("timed out after {millis}ms"));
                }
            }
        }
    };
    // Leftover background jobs would keep the readers blocked.
    kill_process_group(child_pid);

    let stdout_buf = stdout_thread.join().unwrap_or_default();
    let stderr_buf = stderr_thread.join().unwrap_or_default();

    let status = match wait_result {
        Ok(s) => s,
        Err(e) => return (false, format!("wait failed: {e}")),
    };

    format_output(status.success(), &stdout_buf, &stderr_buf)
}

/// Combine stdout/stderr and cap to 10KB (keeping the tail).
fn format_output(success: bool, stdout: &str, stderr: &str) -> (bool, String) {
    let output = if stderr.is_empty() {
        stdout.to_string()
    } else if stdout.is_empty() {
        stderr.to_string()
    } else {
        format!("{stdout}\n{stderr}")
    };
    const MAX_OUTPUT: usize = 10 * 1024;
    let trimmed = output.trim();
    let capped = if trimmed.len() > MAX_OUTPUT {
        let mut start = trimmed.len() - MAX_OUTPUT;
        while !trimmed.is_char_boundary(start) {
            start += 1;
        }
        &trimmed[start..]
    } else {
        trimmed
    };
    (success, capped.to_string())
}

/// SIGKILL every process in the group led by `pgid`. Best-effort; an empty
/// group is not an error worth reporting.
fn kill_process_group(pgid: u32) {
    let _ = Command::new("kill")
        .args(["-9", "--"])
        .arg(format!("-{pgid}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
