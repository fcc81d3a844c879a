pub mod anomaly;
pub mod config;
pub mod gate;
pub mod guidance;
pub mod init;
pub mod pattern;
pub mod task;
pub mod threshold;

use anyhow::Context;
use serde_json::Value;

/// Parse a JSON command-line argument, naming the flag on failure.
pub fn parse_json_arg(raw: &str, flag: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("{flag} is not valid JSON"))
}

/// Read and parse a JSON file given on the command line.
pub fn read_json_file(path: &std::path::Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}
