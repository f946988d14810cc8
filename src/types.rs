use crate::diagnostics::ArtifactRef;
use crate::errors::{FailureKind, PipelineError};
use crate::pipeline::PipelineState;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A credential that never shows up in logs, `Debug` output or reports.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Headless,
    Headed,
}

impl RunMode {
    pub fn is_headless(self) -> bool {
        matches!(self, RunMode::Headless)
    }
}

impl FromStr for RunMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headless" => Ok(RunMode::Headless),
            "headed" => Ok(RunMode::Headed),
            other => Err(PipelineError::Configuration(format!(
                "mode must be 'headless' or 'headed', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Headless => f.write_str("headless"),
            RunMode::Headed => f.write_str("headed"),
        }
    }
}

/// Input for one pipeline run. Immutable once the run starts.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    #[serde(alias = "email")]
    pub identifier: String,
    #[serde(alias = "password")]
    pub secret: Secret,
    #[serde(default)]
    pub mode: RunMode,
}

impl RunRequest {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>, mode: RunMode) -> Self {
        Self {
            identifier: identifier.into(),
            secret: Secret::new(secret),
            mode,
        }
    }

    pub fn headless(&self) -> bool {
        self.mode.is_headless()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Authenticated,
    Anonymous,
    /// Detection itself failed; branches like `Anonymous`.
    Unknown,
}

impl SessionState {
    pub fn needs_login(self) -> bool {
        !matches!(self, SessionState::Authenticated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    /// A best-effort step failed and the run carried on without it.
    Degraded,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub outcome: StepOutcome,
    pub diagnostic: Option<ArtifactRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    pub step: String,
    pub kind: FailureKind,
    pub cause: String,
    pub diagnostic: Option<ArtifactRef>,
}

/// Terminal outcome handed back to the caller, one per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub final_state: PipelineState,
    pub transitions: Vec<PipelineState>,
    pub session_state: Option<SessionState>,
    pub steps: Vec<StepResult>,
    pub artifacts: Vec<ArtifactRef>,
    pub failure: Option<RunFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.final_state == PipelineState::Closed
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step_name == name)
    }
}
