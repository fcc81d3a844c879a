use crate::cmd::parse_json_arg;
use crate::output::print_json;
use anyhow::Context;
use qgate_core::{
    config::Config,
    learning::{HttpGuidanceSource, LearningClient},
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Guidance is JSON from the learning system, so it is always printed as JSON.
pub fn run(root: &Path, gate_type: &str, payload: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let endpoint = config
        .learning
        .endpoint
        .clone()
        .context("learning.endpoint is not set in .qgate/config.yaml")?;
    let payload = match payload {
        Some(raw) => parse_json_arg(raw, "--payload")?,
        None => json!({}),
    };

    let client = LearningClient::new(Arc::new(HttpGuidanceSource::new(endpoint)))
        .with_retries(config.learning.retries)
        .with_timeout(Duration::from_millis(config.learning.timeout_ms));

    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let guidance = rt.block_on(client.get_learning_guidance(payload, gate_type))?;
    print_json(&guidance)
}
