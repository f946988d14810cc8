use crate::diagnostics::ArtifactRef;
use crate::errors::{PipelineError, Result};
use crate::types::{SessionState, StepOutcome, StepResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    SessionChecked,
    Authenticated,
    Anonymous,
    Navigated,
    Filtered,
    ProductSelected,
    InCart,
    CheckedOut,
    Closed,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Closed | PipelineState::Failed)
    }

    /// Forward edges of the happy path. `Failed` is reachable from any
    /// non-terminal state and is handled separately.
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Init, SessionChecked)
                | (SessionChecked, Authenticated)
                | (SessionChecked, Anonymous)
                | (Authenticated, Navigated)
                | (Anonymous, Navigated)
                | (Navigated, Filtered)
                | (Filtered, ProductSelected)
                | (ProductSelected, InCart)
                | (InCart, CheckedOut)
                | (CheckedOut, Closed)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything a run has done so far: visited states and finished steps.
#[derive(Debug)]
pub struct RunTrace {
    states: Vec<PipelineState>,
    steps: Vec<StepResult>,
    session_state: Option<SessionState>,
    current_step: Option<String>,
}

impl RunTrace {
    pub fn new() -> Self {
        Self {
            states: vec![PipelineState::Init],
            steps: Vec::new(),
            session_state: None,
            current_step: None,
        }
    }

    pub fn current(&self) -> PipelineState {
        *self.states.last().unwrap_or(&PipelineState::Init)
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.session_state
    }

    pub fn set_session_state(&mut self, state: SessionState) {
        self.session_state = Some(state);
    }

    /// Name of the most recently started step.
    pub fn current_step(&self) -> Option<&str> {
        self.current_step.as_deref()
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        let current = self.current();
        if !current.can_advance_to(next) {
            return Err(PipelineError::Unexpected(format!(
                "illegal transition {} -> {}",
                current, next
            )));
        }
        self.states.push(next);
        Ok(())
    }

    /// Move to `Failed`. No-op once the run has already terminated.
    pub fn fail(&mut self) {
        if !self.current().is_terminal() {
            self.states.push(PipelineState::Failed);
        }
    }

    pub fn begin_step(&mut self, name: &str) {
        self.current_step = Some(name.to_string());
    }

    pub fn finish_step(&mut self, outcome: StepOutcome, diagnostic: Option<ArtifactRef>) {
        let step_name = self.current_step.clone().unwrap_or_default();
        self.steps.push(StepResult {
            step_name,
            outcome,
            diagnostic,
        });
    }

    /// True when the current step has not recorded a result yet, as when it
    /// was cut off by cancellation.
    pub fn step_unfinished(&self) -> bool {
        match (&self.current_step, self.steps.last()) {
            (Some(current), Some(last)) => &last.step_name != current,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    pub fn into_parts(self) -> (Vec<PipelineState>, Vec<StepResult>, Option<SessionState>) {
        (self.states, self.steps, self.session_state)
    }
}

impl Default for RunTrace {
    fn default() -> Self {
        Self::new()
    }
}
