pub mod browser;
pub mod core;
pub mod diagnostics;
pub mod errors;
pub mod pipeline;
pub mod steps;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

#[cfg(feature = "chrome")]
pub use crate::browser::{ChromeLauncher, ChromePage};
pub use crate::core::{BrowserLauncher, Config, PageHandle, Selector};
pub use crate::diagnostics::{ArtifactRef, DiagnosticRecorder};
pub use crate::errors::{FailureKind, PipelineError};
pub use crate::pipeline::{Orchestrator, PipelineState};
pub use crate::types::*;
