use crate::core::config::millis;
use crate::errors::Result;
use crate::steps::StepContext;
use crate::types::SessionState;
use tracing::{info, warn};

/// Decide the session state from the account link's text.
///
/// Matching is case-insensitive; empty phrases are ignored.
pub fn classify_login_text(text: &str, signed_out_phrases: &[String]) -> SessionState {
    let haystack = text.to_lowercase();
    let signed_out = signed_out_phrases
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .any(|p| haystack.contains(&p));

    if signed_out {
        SessionState::Anonymous
    } else {
        SessionState::Authenticated
    }
}

/// Inspect the account link. Never fails: when the link cannot be read the
/// result is `Unknown`, which callers treat like `Anonymous`.
pub async fn detect(ctx: &StepContext<'_>) -> SessionState {
    match read_login_text(ctx).await {
        Ok(text) => {
            let state = classify_login_text(&text, &ctx.config.site.signed_out_phrases);
            match state {
                SessionState::Authenticated => {
                    info!(account = %text.lines().next().unwrap_or_default(), "User is logged in")
                }
                _ => info!("There is no active session"),
            }
            state
        }
        Err(e) => {
            warn!(error = %e, "Could not determine login status, will attempt login");
            SessionState::Unknown
        }
    }
}

async fn read_login_text(ctx: &StepContext<'_>) -> Result<String> {
    let link = ctx
        .page
        .wait_for(
            &ctx.locators().login_link,
            millis(ctx.timeouts().session_detect_ms),
        )
        .await?;
    ctx.page.read_text(&link).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::diagnostics::DiagnosticRecorder;
    use crate::testing::ScriptedPage;

    fn phrases() -> Vec<String> {
        vec!["identifícate".to_string(), "Sign in".to_string()]
    }

    #[test]
    fn test_classify_signed_out_texts() {
        assert_eq!(
            classify_login_text("Hola, Identifícate\nCuenta y Listas", &phrases()),
            SessionState::Anonymous
        );
        assert_eq!(
            classify_login_text("Hello, sign in\nAccount & Lists", &phrases()),
            SessionState::Anonymous
        );
    }

    #[test]
    fn test_classify_signed_in_text() {
        assert_eq!(
            classify_login_text("Hola, Ana\nCuenta y Listas", &phrases()),
            SessionState::Authenticated
        );
    }

    #[test]
    fn test_blank_phrases_never_match() {
        let blank = vec!["".to_string(), "  ".to_string()];
        assert_eq!(
            classify_login_text("anything", &blank),
            SessionState::Authenticated
        );
    }

    #[tokio::test]
    async fn test_detect_reads_account_link() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(dir.path());
        let config = Config::default();

        let signed_in = ScriptedPage::storefront(&config, true);
        let ctx = StepContext::new(&signed_in, &recorder, &config);
        assert_eq!(detect(&ctx).await, SessionState::Authenticated);

        let signed_out = ScriptedPage::storefront(&config, false);
        let ctx = StepContext::new(&signed_out, &recorder, &config);
        assert_eq!(detect(&ctx).await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_detect_missing_link_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(dir.path());
        let config = Config::default();
        let page = ScriptedPage::storefront(&config, true)
            .without(&config.site.locators.login_link);
        let ctx = StepContext::new(&page, &recorder, &config);

        assert_eq!(detect(&ctx).await, SessionState::Unknown);
    }
}
