use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Interaction with {target} failed: {reason}")]
    Interaction { target: String, reason: String },

    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Diagnostic capture failed: {0}")]
    Diagnostic(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Run cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Coarse classification used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An expected element or condition never appeared within its budget.
    Timeout,
    /// A click or fill hit a stale or occluded element.
    Interaction,
    /// The run was aborted from outside.
    Cancelled,
    Unexpected,
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Timeout { .. } => FailureKind::Timeout,
            PipelineError::Interaction { .. } => FailureKind::Interaction,
            PipelineError::Cancelled(_) => FailureKind::Cancelled,
            _ => FailureKind::Unexpected,
        }
    }

    pub fn timeout(what: impl Into<String>, timeout_ms: u64) -> Self {
        PipelineError::Timeout {
            what: what.into(),
            timeout_ms,
        }
    }

    pub fn interaction(target: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        PipelineError::Interaction {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

// Browser backend errors arrive as anyhow::Error
impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Unexpected(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Unexpected(format!("browser task aborted: {}", err))
    }
}
