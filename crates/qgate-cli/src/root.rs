use qgate_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the qgate root directory.
///
/// Priority:
/// 1. `--root` flag / `QGATE_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.qgate/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd, paths::QGATE_DIR)
        .or_else(|| find_upward(&cwd, ".git"))
        .unwrap_or(cwd)
}

fn find_upward(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_dir())
        .map(Path::to_path_buf)
}

/// Locations of the two shared control documents.
pub struct ControlDocs {
    pub workflow_state: PathBuf,
    pub dashboard: PathBuf,
}

impl ControlDocs {
    /// Overrides come from `--workflow-state` / `WORKFLOW_STATE_PATH` and
    /// `--dashboard` / `QUALITY_DASHBOARD_PATH`.
    pub fn resolve(root: &Path, workflow_state: Option<&Path>, dashboard: Option<&Path>) -> Self {
        Self {
            workflow_state: paths::workflow_state_path(root, workflow_state),
            dashboard: paths::dashboard_path(root, dashboard),
        }
    }
}
