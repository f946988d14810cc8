use crate::core::config::millis;
use crate::core::ClickOptions;
use crate::errors::Result;
use crate::steps::{diagnose_failure, StepContext};
use crate::types::Secret;
use tracing::info;

/// Sign in through the two-stage form: identifier first, then the secret.
///
/// Any failure is captured as `error_login` and returned; there is no retry.
pub async fn authenticate(ctx: &StepContext<'_>, identifier: &str, secret: &Secret) -> Result<()> {
    diagnose_failure(ctx, "error_login", sign_in(ctx, identifier, secret)).await
}

async fn sign_in(ctx: &StepContext<'_>, identifier: &str, secret: &Secret) -> Result<()> {
    let locators = ctx.locators();
    let timeouts = ctx.timeouts();
    let page = ctx.page;

    info!("Logging into account");
    ctx.wait_and_click(&locators.login_link, timeouts.login_link_ms, ClickOptions::default())
        .await?;

    info!("Waiting for identifier input");
    let field = page
        .wait_for(&locators.identifier_input, millis(timeouts.identifier_ms))
        .await?;
    page.fill(&field, identifier).await?;
    ctx.snapshot("login_identifier").await;

    ctx.wait_and_click(&locators.continue_button, timeouts.identifier_ms, ClickOptions::default())
        .await?;

    info!("Waiting for secret input");
    let field = page
        .wait_for(&locators.secret_input, millis(timeouts.secret_ms))
        .await?;
    page.fill(&field, secret.expose()).await?;
    ctx.snapshot("login_secret").await;

    ctx.wait_and_click(&locators.submit_button, timeouts.secret_ms, ClickOptions::default())
        .await?;

    info!("Credentials submitted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::diagnostics::DiagnosticRecorder;
    use crate::errors::FailureKind;
    use crate::testing::ScriptedPage;

    #[tokio::test]
    async fn test_two_stage_form_is_filled_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(dir.path());
        let config = Config::default();
        let page = ScriptedPage::storefront(&config, false);
        let probe = page.probe();
        let ctx = StepContext::new(&page, &recorder, &config);

        tokio_test::assert_ok!(authenticate(&ctx, "a@example.com", &Secret::new("x")).await);

        let locators = &config.site.locators;
        assert_eq!(
            probe.filled(&locators.identifier_input).as_deref(),
            Some("a@example.com")
        );
        assert_eq!(probe.filled(&locators.secret_input).as_deref(), Some("x"));
        assert_eq!(probe.clicked(&locators.submit_button), Some(false));

        let labels: Vec<String> = recorder.artifacts().into_iter().map(|a| a.label).collect();
        assert_eq!(labels, vec!["login_identifier", "login_secret"]);
    }

    #[tokio::test]
    async fn test_missing_secret_field_is_fatal_and_diagnosed() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(dir.path());
        let config = Config::default();
        let page = ScriptedPage::storefront(&config, false)
            .without(&config.site.locators.secret_input);
        let ctx = StepContext::new(&page, &recorder, &config);

        let err = authenticate(&ctx, "a@example.com", &Secret::new("x"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Timeout);
        assert!(err.to_string().contains("10000ms"));
        assert_eq!(recorder.last().unwrap().label, "error_login");
    }

    #[tokio::test]
    async fn test_form_buttons_are_waited_for() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(dir.path());
        let config = Config::default();
        let page = ScriptedPage::storefront(&config, false);
        let probe = page.probe();
        let ctx = StepContext::new(&page, &recorder, &config);

        tokio_test::assert_ok!(authenticate(&ctx, "a@example.com", &Secret::new("x")).await);

        let locators = &config.site.locators;
        assert_eq!(
            probe.waited_for(&locators.continue_button),
            Some(config.timeouts.identifier_ms)
        );
        assert_eq!(
            probe.waited_for(&locators.submit_button),
            Some(config.timeouts.secret_ms)
        );
    }

    #[tokio::test]
    async fn test_missing_continue_button_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(dir.path());
        let config = Config::default();
        let page = ScriptedPage::storefront(&config, false)
            .without(&config.site.locators.continue_button);
        let probe = page.probe();
        let ctx = StepContext::new(&page, &recorder, &config);

        let err = authenticate(&ctx, "a@example.com", &Secret::new("x"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Timeout);
        assert_eq!(probe.filled(&config.site.locators.secret_input), None);
    }
}
