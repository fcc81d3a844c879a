//! Client for the external learning system.
//!
//! Guidance calls are retried a fixed number of times, each attempt bounded
//! by a timeout. Outcomes are appended to the decision log on a best-effort
//! basis.

use crate::error::LearningApiError;
use crate::io;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// GuidanceSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuidanceRequest {
    pub payload: Value,
    pub gate_type: String,
}

#[derive(Debug, Error)]
pub enum GuidanceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("guidance endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

/// One attempt at fetching guidance. Implementations need not time out on
/// their own; [`LearningClient`] bounds every call.
#[async_trait]
pub trait GuidanceSource: Send + Sync {
    async fn fetch_guidance(&self, request: &GuidanceRequest) -> Result<Value, GuidanceError>;
}

/// POSTs the request as JSON and returns the JSON response body.
pub struct HttpGuidanceSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGuidanceSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GuidanceSource for HttpGuidanceSource {
    async fn fetch_guidance(&self, request: &GuidanceRequest) -> Result<Value, GuidanceError> {
        let resp = self.client.post(&self.endpoint).json(request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GuidanceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

// ---------------------------------------------------------------------------
// LearningClient
// ---------------------------------------------------------------------------

pub struct LearningClient {
    source: Arc<dyn GuidanceSource>,
    retries: u32,
    timeout: Duration,
}

impl LearningClient {
    pub fn new(source: Arc<dyn GuidanceSource>) -> Self {
        Self {
            source,
            retries: DEFAULT_RETRIES,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Total attempts, not additional ones. Clamped to at least 1.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the learning system for guidance on `gate_type`.
    ///
    /// Attempts run back to back with no delay. A timed-out attempt is
    /// dropped before the next one starts.
    pub async fn get_learning_guidance(
        &self,
        payload: Value,
        gate_type: &str,
    ) -> Result<Value, LearningApiError> {
        let request = GuidanceRequest {
            payload,
            gate_type: gate_type.to_string(),
        };
        let mut last_error = String::new();

        for attempt in 1..=self.retries {
            match tokio::time::timeout(self.timeout, self.source.fetch_guidance(&request)).await {
                Ok(Ok(guidance)) => {
                    tracing::debug!(attempt, gate = gate_type, "learning guidance received");
                    return Ok(guidance);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!("timed out after {}ms", self.timeout.as_millis());
                }
            }
            tracing::debug!(attempt, gate = gate_type, "guidance attempt failed: {last_error}");
        }

        tracing::warn!(
            attempts = self.retries,
            gate = gate_type,
            "learning API exhausted: {last_error}"
        );
        Err(LearningApiError {
            attempts: self.retries,
            message: last_error,
        })
    }
}

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeEntry {
    pub mode: String,
    pub gate_type: String,
    pub result: String,
    pub confidence: f64,
    pub context: Value,
    pub successful_applications: u64,
    pub failed_applications: u64,
}

pub fn format_outcome(entry: &OutcomeEntry, at: DateTime<Utc>) -> String {
    format!(
        "\n## Learning Outcome - {ts}\n\
         - Mode: {mode}\n\
         - Gate: {gate}\n\
         - Result: {result}\n\
         - Confidence: {confidence:.2}\n\
         - Context: {context}\n\
         - Successful applications: {ok}\n\
         - Failed applications: {failed}\n",
        ts = at.to_rfc3339_opts(SecondsFormat::Secs, true),
        mode = entry.mode,
        gate = entry.gate_type,
        result = entry.result,
        confidence = entry.confidence,
        context = entry.context,
        ok = entry.successful_applications,
        failed = entry.failed_applications,
    )
}

/// Append `entry` to the decision log. Failures are logged, never returned.
pub fn log_outcome(path: &Path, entry: &OutcomeEntry) {
    let block = format_outcome(entry, Utc::now());
    if let Err(e) = io::append_text(path, &block) {
        tracing::warn!("could not append to decision log {}: {e}", path.display());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Hangs on every attempt except `succeed_on` (1-based).
    struct ScriptedSource {
        calls: AtomicU32,
        succeed_on: Option<u32>,
        fail_fast: bool,
    }

    impl ScriptedSource {
        fn new(succeed_on: Option<u32>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                succeed_on,
                fail_fast: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                succeed_on: None,
                fail_fast: true,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GuidanceSource for ScriptedSource {
        async fn fetch_guidance(&self, request: &GuidanceRequest) -> Result<Value, GuidanceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.succeed_on {
                return Ok(json!({"attempt": n, "gate": request.gate_type}));
            }
            if self.fail_fast {
                return Err(GuidanceError::Other(format!("boom {n}")));
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(GuidanceError::Other("unreachable".into()))
        }
    }

    fn client(source: Arc<ScriptedSource>, retries: u32) -> LearningClient {
        LearningClient::new(source)
            .with_retries(retries)
            .with_timeout(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn every_attempt_timing_out_raises_after_exactly_retries() {
        let source = ScriptedSource::new(None);
        let err = client(source.clone(), 3)
            .get_learning_guidance(json!({}), "general")
            .await
            .unwrap_err();
        assert_eq!(source.calls(), 3);
        assert_eq!(err.attempts, 3);
        assert!(err.message.contains("timed out"));
    }

    #[tokio::test]
    async fn success_on_last_allowed_attempt_stops() {
        let source = ScriptedSource::new(Some(3));
        let guidance = client(source.clone(), 3)
            .get_learning_guidance(json!({"score": 0.7}), "security")
            .await
            .unwrap();
        assert_eq!(guidance["attempt"], json!(3));
        assert_eq!(guidance["gate"], json!("security"));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn first_success_returns_immediately() {
        let source = ScriptedSource::new(Some(1));
        client(source.clone(), 5)
            .get_learning_guidance(json!({}), "general")
            .await
            .unwrap();
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn last_error_message_is_carried() {
        let source = ScriptedSource::failing();
        let err = client(source.clone(), 2)
            .get_learning_guidance(json!({}), "general")
            .await
            .unwrap_err();
        assert_eq!(source.calls(), 2);
        assert_eq!(err.message, "boom 2");
        assert!(err.to_string().contains("after 2 attempt(s)"));
    }

    #[test]
    fn retries_are_at_least_one() {
        let c = LearningClient::new(ScriptedSource::new(None)).with_retries(0);
        assert_eq!(c.retries(), 1);
        let c = LearningClient::new(ScriptedSource::new(None));
        assert_eq!(c.retries(), DEFAULT_RETRIES);
        assert_eq!(c.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }

    #[tokio::test]
    async fn http_source_posts_request_and_parses_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/guidance")
            .match_body(mockito::Matcher::PartialJson(
                json!({"gate_type": "general", "payload": {"score": 0.6}}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"recommendation": "raise coverage"}"#)
            .create_async()
            .await;

        let source = Arc::new(HttpGuidanceSource::new(format!("{}/guidance", server.url())));
        let guidance = LearningClient::new(source)
            .get_learning_guidance(json!({"score": 0.6}), "general")
            .await
            .unwrap();
        assert_eq!(guidance["recommendation"], json!("raise coverage"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_error_status_is_retried_then_raised() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/guidance")
            .with_status(503)
            .with_body("overloaded")
            .expect(2)
            .create_async()
            .await;

        let source = Arc::new(HttpGuidanceSource::new(format!("{}/guidance", server.url())));
        let err = LearningClient::new(source)
            .with_retries(2)
            .get_learning_guidance(json!({}), "general")
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(err.message.contains("503"));
        mock.assert_async().await;
    }

    fn entry() -> OutcomeEntry {
        OutcomeEntry {
            mode: "qa".into(),
            gate_type: "general".into(),
            result: "success".into(),
            confidence: 0.6,
            context: json!({"pattern": "null-check"}),
            successful_applications: 4,
            failed_applications: 1,
        }
    }

    #[test]
    fn outcome_block_has_fixed_fields() {
        let at = DateTime::parse_from_rfc3339("2026-10-15T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let block = format_outcome(&entry(), at);
        assert!(block.contains("## Learning Outcome - 2026-10-15T08:30:00Z"));
        assert!(block.contains("- Mode: qa\n"));
        assert!(block.contains("- Gate: general\n"));
        assert!(block.contains("- Result: success\n"));
        assert!(block.contains("- Confidence: 0.60\n"));
        assert!(block.contains(r#"- Context: {"pattern":"null-check"}"#));
        assert!(block.contains("- Successful applications: 4\n"));
        assert!(block.contains("- Failed applications: 1\n"));
    }

    #[test]
    fn log_outcome_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/decision-log.md");
        log_outcome(&path, &entry());
        log_outcome(&path, &entry());
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("## Learning Outcome").count(), 2);
    }

    #[test]
    fn log_outcome_swallows_io_errors() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the append fail.
        let path = dir.path().join("decision-log.md");
        std::fs::create_dir(&path).unwrap();
        log_outcome(&path, &entry());
        assert!(path.is_dir());
    }
}
