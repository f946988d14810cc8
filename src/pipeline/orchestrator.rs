use crate::core::config::millis;
use crate::core::{BrowserLauncher, Config, PageHandle, WaitPolicy};
use crate::diagnostics::DiagnosticRecorder;
use crate::errors::{FailureKind, PipelineError, Result};
use crate::pipeline::state::{PipelineState, RunTrace};
use crate::steps::{self, best_effort, StepContext};
use crate::types::{RunFailure, RunReport, RunRequest, StepOutcome};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

const FINAL_DIAGNOSTIC: &str = "run_failed";

/// Drives one purchase run from launch to teardown.
///
/// Each run opens its own page, so one orchestrator can serve concurrent
/// runs without any locking between them.
pub struct Orchestrator<L: BrowserLauncher> {
    launcher: L,
    config: Arc<Config>,
}

impl<L: BrowserLauncher> Orchestrator<L> {
    pub fn new(launcher: L, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            launcher,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub async fn run(&self, request: RunRequest) -> RunReport {
        self.run_until(request, std::future::pending()).await
    }

    /// Run the pipeline, aborting when `cancel` resolves or the configured
    /// run timeout elapses. An abort is handled like any other failure.
    pub async fn run_until<C>(&self, request: RunRequest, cancel: C) -> RunReport
    where
        C: Future<Output = ()> + Send,
    {
        let run_id = Uuid::new_v4();
        self.execute(run_id, request, cancel)
            .instrument(info_span!("run", %run_id))
            .await
    }

    async fn execute<C>(&self, run_id: Uuid, request: RunRequest, cancel: C) -> RunReport
    where
        C: Future<Output = ()> + Send,
    {
        let recorder = DiagnosticRecorder::new(
            self.config
                .diagnostics
                .output_dir
                .join(run_id.to_string()),
        );
        let mut trace = RunTrace::new();

        let run_timeout = self.config.run_timeout();
        let deadline = async move {
            match run_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        // one budget for launch and steps together
        tokio::pin!(cancel);
        tokio::pin!(deadline);

        info!(mode = %request.mode, "Starting run");
        let launched = tokio::select! {
            result = self.launcher.open(&self.config.browser, request.headless()) => result,
            _ = &mut cancel => Err(aborted_by_caller()),
            _ = &mut deadline => Err(self.run_timed_out()),
        };
        let page = match launched {
            Ok(page) => page,
            Err(e) => {
                error!(error = %e, "Browser session could not be opened");
                trace.fail();
                let failure = RunFailure {
                    step: "launch".to_string(),
                    kind: e.kind(),
                    cause: e.to_string(),
                    diagnostic: None,
                };
                return build_report(run_id, trace, &recorder, Some(failure));
            }
        };

        let outcome = {
            let ctx = StepContext::new(&page, &recorder, &self.config);
            tokio::select! {
                result = drive(&ctx, &request, &mut trace) => result,
                _ = &mut cancel => Err(aborted_by_caller()),
                _ = &mut deadline => Err(self.run_timed_out()),
            }
        };

        let failure = match outcome {
            Ok(()) => None,
            Err(e) => Some(self.handle_failure(&page, &recorder, &mut trace, e).await),
        };

        // teardown happens on every path once a page exists
        if let Err(e) = page.close().await {
            warn!(error = %e, "Browser session did not close cleanly");
        }
        if failure.is_none() {
            if let Err(e) = trace.advance(PipelineState::Closed) {
                warn!(error = %e, "Could not record session close");
            }
        }

        info!(state = %trace.current(), "Run finished");
        build_report(run_id, trace, &recorder, failure)
    }

    fn run_timed_out(&self) -> PipelineError {
        PipelineError::Cancelled(format!(
            "run exceeded {}ms",
            self.config.run_timeout_ms.unwrap_or_default()
        ))
    }

    async fn handle_failure(
        &self,
        page: &L::Page,
        recorder: &DiagnosticRecorder,
        trace: &mut RunTrace,
        error: PipelineError,
    ) -> RunFailure {
        let step = trace.current_step().unwrap_or("pipeline").to_string();
        error!(step = %step, state = %trace.current(), error = %error, "Run failed");

        if trace.step_unfinished() {
            trace.finish_step(StepOutcome::Failure, None);
        }
        trace.fail();

        let diagnostic = recorder
            .capture_quietly(page, FINAL_DIAGNOSTIC)
            .await
            .or_else(|| recorder.last());

        RunFailure {
            step,
            kind: error.kind(),
            cause: error.to_string(),
            diagnostic,
        }
    }
}

fn aborted_by_caller() -> PipelineError {
    PipelineError::Cancelled("aborted by caller".to_string())
}

async fn drive(ctx: &StepContext<'_>, request: &RunRequest, trace: &mut RunTrace) -> Result<()> {
    run_step(trace, ctx, "open_home", open_home(ctx)).await?;

    let session = run_step(trace, ctx, "detect_session", async {
        Ok::<_, PipelineError>(steps::detect(ctx).await)
    })
    .await?;
    trace.set_session_state(session);
    trace.advance(PipelineState::SessionChecked)?;

    if session.needs_login() {
        trace.advance(PipelineState::Anonymous)?;
        run_step(
            trace,
            ctx,
            "authenticate",
            steps::authenticate(ctx, &request.identifier, &request.secret),
        )
        .await?;
    } else {
        info!("Session detected, login not necessary");
        trace.advance(PipelineState::Authenticated)?;
    }

    run_step(trace, ctx, "navigate_to_category", steps::navigate_to_category(ctx)).await?;
    trace.advance(PipelineState::Navigated)?;

    trace.begin_step("apply_filter");
    let before = ctx.recorder.count();
    let filtered = best_effort(
        "apply_filter",
        &[FailureKind::Timeout, FailureKind::Interaction],
        steps::apply_filter(ctx),
    )
    .await;
    let outcome = match &filtered {
        Ok(Some(())) => StepOutcome::Success,
        Ok(None) => StepOutcome::Degraded,
        Err(_) => StepOutcome::Failure,
    };
    trace.finish_step(outcome, new_artifact(ctx.recorder, before));
    filtered?;
    trace.advance(PipelineState::Filtered)?;

    run_step(trace, ctx, "select_product", steps::select_first_product(ctx)).await?;
    trace.advance(PipelineState::ProductSelected)?;

    run_step(trace, ctx, "add_to_cart", steps::add_to_cart(ctx)).await?;
    trace.advance(PipelineState::InCart)?;

    run_step(trace, ctx, "proceed_to_checkout", steps::proceed_to_checkout(ctx)).await?;
    trace.advance(PipelineState::CheckedOut)?;

    Ok(())
}

async fn open_home(ctx: &StepContext<'_>) -> Result<()> {
    ctx.page
        .navigate(
            &ctx.config.site.base_url,
            WaitPolicy::DomContentLoaded,
            millis(ctx.timeouts().navigation_ms),
        )
        .await?;
    ctx.snapshot("home").await;
    Ok(())
}

async fn run_step<T, F>(trace: &mut RunTrace, ctx: &StepContext<'_>, name: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    trace.begin_step(name);
    let before = ctx.recorder.count();
    let result = fut.await;
    let outcome = if result.is_ok() {
        StepOutcome::Success
    } else {
        StepOutcome::Failure
    };
    trace.finish_step(outcome, new_artifact(ctx.recorder, before));
    result
}

fn new_artifact(
    recorder: &DiagnosticRecorder,
    before: usize,
) -> Option<crate::diagnostics::ArtifactRef> {
    if recorder.count() > before {
        recorder.last()
    } else {
        None
    }
}

fn build_report(
    run_id: Uuid,
    trace: RunTrace,
    recorder: &DiagnosticRecorder,
    failure: Option<RunFailure>,
) -> RunReport {
    let final_state = trace.current();
    let (transitions, steps, session_state) = trace.into_parts();
    RunReport {
        run_id,
        final_state,
        transitions,
        session_state,
        steps,
        artifacts: recorder.artifacts(),
        failure,
    }
}
