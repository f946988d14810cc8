use crate::core::config::millis;
use crate::core::{ClickOptions, Selector};
use crate::errors::Result;
use crate::steps::{diagnose_failure, StepContext};
use tracing::info;

/// Walk the menu: root menu, top-level category, second level, leaf.
pub async fn navigate_to_category(ctx: &StepContext<'_>) -> Result<()> {
    let locators = ctx.locators();
    let wait_ms = ctx.timeouts().category_ms;

    info!("Opening root menu");
    // menu handlers attach after load with nothing observable to wait on
    ctx.settle().await;
    ctx.wait_and_click(&locators.root_menu, wait_ms, ClickOptions::forced())
        .await?;
    ctx.snapshot("root_menu").await;

    info!("Selecting top-level category");
    ctx.wait_and_click(&locators.top_category, wait_ms, ClickOptions::default())
        .await?;
    ctx.snapshot("category").await;

    info!("Selecting second-level category");
    ctx.wait_and_click(&locators.second_category, wait_ms, ClickOptions::forced())
        .await?;
    ctx.snapshot("subcategory").await;

    info!("Selecting leaf category");
    ctx.wait_and_click(&locators.leaf_category, wait_ms, ClickOptions::default())
        .await?;
    ctx.snapshot("leaf_category").await;

    info!("Category reached");
    Ok(())
}

/// Click the size filter link and wait for the listing to reload.
///
/// Failures are captured as `error_filter` and returned; the caller decides
/// whether the run can go on without the filter.
pub async fn apply_filter(ctx: &StepContext<'_>) -> Result<()> {
    diagnose_failure(ctx, "error_filter", click_size_filter(ctx)).await
}

async fn click_size_filter(ctx: &StepContext<'_>) -> Result<()> {
    let label = &ctx.config.site.size_filter_label;
    let timeouts = ctx.timeouts();

    info!(filter = %label, "Filtering by size");
    let link = ctx
        .page
        .wait_for(&Selector::link_with_text(label), millis(timeouts.size_filter_ms))
        .await?;
    ctx.page.scroll_into_view(&link).await?;
    ctx.page.click(&link, ClickOptions::forced()).await?;
    ctx.page
        .wait_network_idle(millis(timeouts.network_idle_ms))
        .await?;
    ctx.snapshot("size_filter").await;

    info!("Size filter applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::diagnostics::DiagnosticRecorder;
    use crate::errors::FailureKind;
    use crate::testing::{PageEvent, ScriptedPage};

    fn quick_config() -> Config {
        let mut config = Config::default();
        config.timeouts.settle_delay_ms = 0;
        config
    }

    #[tokio::test]
    async fn test_menu_clicks_use_force_where_overlays_appear() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(dir.path());
        let config = quick_config();
        let page = ScriptedPage::storefront(&config, true);
        let probe = page.probe();
        let ctx = StepContext::new(&page, &recorder, &config);

        tokio_test::assert_ok!(navigate_to_category(&ctx).await);

        let locators = &config.site.locators;
        assert_eq!(probe.clicked(&locators.root_menu), Some(true));
        assert_eq!(probe.clicked(&locators.top_category), Some(false));
        assert_eq!(probe.clicked(&locators.second_category), Some(true));
        assert_eq!(probe.clicked(&locators.leaf_category), Some(false));
        assert_eq!(recorder.count(), 4);
    }

    #[tokio::test]
    async fn test_missing_leaf_category_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(dir.path());
        let config = quick_config();
        let page = ScriptedPage::storefront(&config, true)
            .without(&config.site.locators.leaf_category);
        let ctx = StepContext::new(&page, &recorder, &config);

        let err = navigate_to_category(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_filter_scrolls_clicks_and_waits_for_idle() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(dir.path());
        let config = quick_config();
        let page = ScriptedPage::storefront(&config, true);
        let probe = page.probe();
        let ctx = StepContext::new(&page, &recorder, &config);

        tokio_test::assert_ok!(apply_filter(&ctx).await);

        let link = Selector::link_with_text("56 pulgadas o más");
        let events = probe.events();
        let scroll = events
            .iter()
            .position(|e| e == &PageEvent::ScrollIntoView(link.clone()))
            .unwrap();
        let click = events
            .iter()
            .position(|e| e == &PageEvent::Click { selector: link.clone(), force: true })
            .unwrap();
        let idle = events.iter().position(|e| e == &PageEvent::NetworkIdle).unwrap();
        assert!(scroll < click && click < idle);
        assert_eq!(recorder.last().unwrap().label, "size_filter");
    }

    #[tokio::test]
    async fn test_filter_failure_is_diagnosed() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DiagnosticRecorder::new(dir.path());
        let config = quick_config();
        let page = ScriptedPage::storefront(&config, true)
            .without(&Selector::link_with_text(&config.site.size_filter_label));
        let ctx = StepContext::new(&page, &recorder, &config);

        let err = apply_filter(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert_eq!(recorder.last().unwrap().label, "error_filter");
    }
}
