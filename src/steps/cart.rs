use crate::core::config::millis;
use crate::core::ClickOptions;
use crate::errors::{FailureKind, Result};
use crate::steps::{best_effort, diagnose_failure, StepContext};
use tracing::info;

/// Add the open product to the cart, then dismiss the upsell interstitial
/// if one shows up. Its absence is the normal case.
pub async fn add_to_cart(ctx: &StepContext<'_>) -> Result<()> {
    diagnose_failure(ctx, "error_add_to_cart", add_and_decline_upsell(ctx)).await
}

async fn add_and_decline_upsell(ctx: &StepContext<'_>) -> Result<()> {
    info!("Adding product to cart");
    ctx.wait_and_click(
        &ctx.locators().add_to_cart_button,
        ctx.timeouts().add_to_cart_ms,
        ClickOptions::forced(),
    )
    .await?;

    let dismissed = best_effort(
        "dismiss_upsell",
        &[FailureKind::Timeout, FailureKind::Interaction],
        dismiss_upsell(ctx),
    )
    .await?;
    if dismissed.is_none() {
        info!("No upsell interstitial dismissed");
        ctx.page
            .wait_network_idle(millis(ctx.timeouts().network_idle_ms))
            .await?;
    }

    ctx.snapshot("added_to_cart").await;
    info!("Product added to cart");
    Ok(())
}

async fn dismiss_upsell(ctx: &StepContext<'_>) -> Result<()> {
    let dismiss = ctx
        .page
        .wait_for(
            &ctx.locators().upsell_dismiss,
            millis(ctx.timeouts().upsell_ms),
        )
        .await?;
    ctx.snapshot("upsell_interstitial").await;
    info!("Upsell interstitial appeared, declining");
    ctx.page.click(&dismiss, ClickOptions::default()).await
}

/// Open the cart and press the checkout control.
pub async fn proceed_to_checkout(ctx: &StepContext<'_>) -> Result<()> {
    diagnose_failure(ctx, "error_checkout", open_cart_and_checkout(ctx)).await
}

async fn open_cart_and_checkout(ctx: &StepContext<'_>) -> Result<()> {
    let locators = ctx.locators();
    let timeouts = ctx.timeouts();

    info!("Proceeding to checkout");
    ctx.wait_and_click(&locators.cart_button, timeouts.cart_ms, ClickOptions::default())
        .await?;
    ctx.page
        .wait_for(&locators.cart_page, millis(timeouts.cart_ms))
        .await?;
    ctx.snapshot("cart_page").await;
    info!("Cart page loaded");

    ctx.wait_and_click(
        &locators.checkout_button,
        timeouts.checkout_ms,
        ClickOptions::forced(),
    )
    .await?;
    ctx.page
        .wait_network_idle(millis(timeouts.network_idle_ms))
        .await?;
    ctx.snapshot("checkout").await;

    info!("Reached checkout");
    Ok(())
}
