//! The individual stages of a purchase run.
//!
//! Every step borrows the page through a [`StepContext`] for the duration of
//! its own call and keeps nothing once it returns.

pub mod auth;
pub mod cart;
pub mod navigate;
pub mod product;
pub mod session;

use crate::core::config::{millis, Locators, TimeoutConfig};
use crate::core::{ClickOptions, Config, PageHandle, Selector};
use crate::diagnostics::{ArtifactRef, DiagnosticRecorder};
use crate::errors::{FailureKind, Result};
use std::future::Future;
use tracing::{error, warn};

pub use auth::authenticate;
pub use cart::{add_to_cart, proceed_to_checkout};
pub use navigate::{apply_filter, navigate_to_category};
pub use product::select_first_product;
pub use session::{classify_login_text, detect};

pub struct StepContext<'a> {
    pub page: &'a dyn PageHandle,
    pub recorder: &'a DiagnosticRecorder,
    pub config: &'a Config,
}

impl<'a> StepContext<'a> {
    pub fn new(page: &'a dyn PageHandle, recorder: &'a DiagnosticRecorder, config: &'a Config) -> Self {
        Self {
            page,
            recorder,
            config,
        }
    }

    pub fn locators(&self) -> &'a Locators {
        &self.config.site.locators
    }

    pub fn timeouts(&self) -> &'a TimeoutConfig {
        &self.config.timeouts
    }

    /// Capture a diagnostic; a failed capture is logged and otherwise ignored.
    pub async fn snapshot(&self, label: &str) -> Option<ArtifactRef> {
        self.recorder.capture_quietly(self.page, label).await
    }

    pub async fn wait_and_click(
        &self,
        selector: &Selector,
        timeout_ms: u64,
        options: ClickOptions,
    ) -> Result<()> {
        let element = self.page.wait_for(selector, millis(timeout_ms)).await?;
        self.page.click(&element, options).await
    }

    /// Fixed pause for the few places with no observable post-condition.
    pub async fn settle(&self) {
        let delay = self.timeouts().settle_delay_ms;
        if delay > 0 {
            tokio::time::sleep(millis(delay)).await;
        }
    }
}

/// Runs a step whose failure should not end the run.
///
/// Only failures whose kind is listed in `tolerated` are suppressed
/// (`Ok(None)`); anything else still propagates.
pub async fn best_effort<T, F>(step: &str, tolerated: &[FailureKind], fut: F) -> Result<Option<T>>
where
    F: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(value) => Ok(Some(value)),
        Err(e) if tolerated.contains(&e.kind()) => {
            warn!(step, error = %e, "Best-effort step failed, continuing without it");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Captures `label` when `fut` fails, then hands the error back unchanged.
pub async fn diagnose_failure<T, F>(ctx: &StepContext<'_>, label: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(value) => Ok(value),
        Err(e) => {
            error!(label, error = %e, "Step failed");
            ctx.snapshot(label).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use crate::testing::ScriptedPage;

    #[tokio::test]
    async fn test_best_effort_suppresses_declared_kinds_only() {
        let suppressed: Result<Option<()>> = best_effort("filter", &[FailureKind::Timeout], async {
            Err(PipelineError::timeout("filter link", 10))
        })
        .await;
        assert!(matches!(suppressed, Ok(None)));

        let propagated: Result<Option<()>> =
            best_effort("filter", &[FailureKind::Timeout], async {
                Err(PipelineError::Unexpected("renderer gone".into()))
            })
            .await;
        assert_eq!(propagated.unwrap_err().kind(), FailureKind::Unexpected);

        let passed = best_effort("filter", &[], async { Ok(7) }).await.unwrap();
        assert_eq!(passed, Some(7));
    }

    #[tokio::test]
    async fn test_diagnose_failure_captures_and_reraises() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(dir.path());
        let config = Config::default();
        let page = ScriptedPage::new();
        let ctx = StepContext::new(&page, &recorder, &config);

        let result: Result<()> = diagnose_failure(&ctx, "error_checkout", async {
            Err(PipelineError::interaction("#nav-cart", "detached"))
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), FailureKind::Interaction);
        assert_eq!(recorder.last().unwrap().label, "error_checkout");

        let ok: Result<u8> = diagnose_failure(&ctx, "unused", async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
        assert_eq!(recorder.count(), 1);
    }
}
