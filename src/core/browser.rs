use crate::core::config::BrowserConfig;
use crate::core::PageHandle;
use crate::errors::Result;
use async_trait::async_trait;

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Page: PageHandle + 'static;

    /// Launch a browser and open the single page a run drives.
    /// `headless` comes from the run request and overrides `config.headless`.
    async fn open(&self, config: &BrowserConfig, headless: bool) -> Result<Self::Page>;
}
