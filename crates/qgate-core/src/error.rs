use thiserror::Error;

#[derive(Debug, Error)]
pub enum QgateError {
    #[error("not initialized: run 'qgate init'")]
    NotInitialized,

    #[error("failed to load {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("pattern not found: {0}")]
    PatternNotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("invalid project phase '{0}': must be init, dev, stabilization, or release")]
    InvalidPhase(String),

    #[error("orchestrator update failed: {0}")]
    Orchestrator(String),

    #[error(transparent)]
    LearningApi(#[from] LearningApiError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Raised by the learning client once every attempt has failed.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("learning API failed after {attempts} attempt(s): {message}")]
pub struct LearningApiError {
    pub attempts: u32,
    /// Message of the last failed attempt.
    pub message: String,
}

pub type Result<T> = std::result::Result<T, QgateError>;
