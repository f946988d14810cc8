use crate::core::config::millis;
use crate::core::ClickOptions;
use crate::errors::Result;
use crate::steps::{diagnose_failure, StepContext};
use tracing::info;

/// Open the first item in the product listing.
pub async fn select_first_product(ctx: &StepContext<'_>) -> Result<()> {
    diagnose_failure(ctx, "error_select_product", open_first(ctx)).await
}

async fn open_first(ctx: &StepContext<'_>) -> Result<()> {
    info!("Starting product selection");
    // resolves to the first match in document order
    let first = ctx
        .page
        .wait_for(
            &ctx.locators().product_item,
            millis(ctx.timeouts().product_list_ms),
        )
        .await?;
    ctx.page.click(&first, ClickOptions::forced()).await?;
    ctx.snapshot("product_selected").await;
    info!("Product selected");
    Ok(())
}
