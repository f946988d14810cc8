use crate::browser::navigation::{NavigationManager, ScriptEvaluator};
use crate::core::config::BrowserConfig;
use crate::core::{BrowserLauncher, ClickOptions, ElementRef, PageHandle, Selector, WaitPolicy};
use crate::errors::{PipelineError, Result};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::util::Timeout;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

// Chrome drops the DevTools connection after this much silence, which is
// longer than any single wait a run performs.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

const FORCE_CLICK_JS: &str = "function() { this.click(); }";
const CLEAR_VALUE_JS: &str = r#"
    function() {
        this.value = '';
        this.dispatchEvent(new Event('input', { bubbles: true }));
    }
"#;

/// Launches a local Chrome through `headless_chrome`.
#[derive(Debug, Default, Clone)]
pub struct ChromeLauncher;

impl ChromeLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    type Page = ChromePage;

    async fn open(&self, config: &BrowserConfig, headless: bool) -> Result<ChromePage> {
        let config = config.clone();
        let (browser, tab) = tokio::task::spawn_blocking(move || launch(&config, headless)).await??;
        debug!(headless, "Chrome launched");

        Ok(ChromePage {
            browser: Mutex::new(Some(browser)),
            tab,
        })
    }
}

fn launch(config: &BrowserConfig, headless: bool) -> Result<(Browser, Arc<Tab>)> {
    let window_size_arg = format!(
        "--window-size={},{}",
        config.viewport.width, config.viewport.height
    );
    let user_agent_arg = config
        .user_agent
        .as_ref()
        .map(|ua| format!("--user-agent={}", ua));

    let mut args = vec![
        OsStr::new("--no-sandbox"),
        OsStr::new("--disable-dev-shm-usage"),
        OsStr::new(&window_size_arg),
    ];

    if let Some(ref ua_arg) = user_agent_arg {
        args.push(OsStr::new(ua_arg));
    }

    if config.disable_images {
        args.push(OsStr::new("--blink-settings=imagesEnabled=false"));
    }

    for arg in &config.args {
        args.push(OsStr::new(arg));
    }

    let launch_options = LaunchOptions::default_builder()
        .headless(headless)
        .window_size(Some((config.viewport.width, config.viewport.height)))
        .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
        .args(args)
        .build()
        .map_err(|e| PipelineError::LaunchFailed(e.to_string()))?;

    let browser =
        Browser::new(launch_options).map_err(|e| PipelineError::LaunchFailed(e.to_string()))?;

    let tab = browser
        .new_tab()
        .map_err(|e| PipelineError::LaunchFailed(e.to_string()))?;

    Ok((browser, tab))
}

/// One Chrome tab plus the browser process that owns it.
pub struct ChromePage {
    browser: Mutex<Option<Browser>>,
    tab: Arc<Tab>,
}

impl ChromePage {
    // headless_chrome blocks on every DevTools round trip
    async fn with_tab<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab)).await?
    }

    async fn with_element<T, F>(&self, element: &ElementRef, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Element<'_>) -> anyhow::Result<T> + Send + 'static,
    {
        let selector = element.selector.clone();
        self.with_tab(move |tab| {
            let found = find(tab, &selector)
                .map_err(|e| PipelineError::interaction(selector.to_string(), e))?;
            f(&found).map_err(|e| PipelineError::interaction(selector.to_string(), e))
        })
        .await
    }
}

fn find<'a>(tab: &'a Tab, selector: &Selector) -> anyhow::Result<Element<'a>> {
    match selector {
        Selector::Css(css) => tab.find_element(css),
        Selector::XPath(expr) => tab.find_element_by_xpath(expr),
    }
}

// Only an expired wait is a timeout; a lost connection or dead tab is not.
fn wait_error(selector: &Selector, timeout: Duration, err: anyhow::Error) -> PipelineError {
    if err.downcast_ref::<Timeout>().is_some() {
        PipelineError::timeout(selector.to_string(), timeout.as_millis() as u64)
    } else {
        PipelineError::from(err)
    }
}

#[async_trait]
impl ScriptEvaluator for ChromePage {
    async fn evaluate(&self, script: &str) -> Result<Value> {
        let script = script.to_string();
        self.with_tab(move |tab| {
            let result = tab
                .evaluate(&script, false)
                .map_err(|e| PipelineError::Unexpected(format!("script failed: {}", e)))?;
            Ok(result.value.unwrap_or(Value::Null))
        })
        .await
    }
}

#[async_trait]
impl PageHandle for ChromePage {
    async fn navigate(&self, url: &str, wait: WaitPolicy, timeout: Duration) -> Result<()> {
        let target = url.to_string();
        // Page.navigate answers once the new document has committed, so the
        // readiness polling below never sees the previous page.
        self.with_tab(move |tab| {
            tab.navigate_to(&target)
                .map_err(|e| PipelineError::NavigationFailed(e.to_string()))?;
            Ok(())
        })
        .await?;

        NavigationManager::wait_for_policy(self, wait, timeout).await
    }

    async fn locate(&self, selector: &Selector) -> Result<ElementRef> {
        let owned = selector.clone();
        self.with_tab(move |tab| {
            find(tab, &owned).map_err(|e| PipelineError::interaction(owned.to_string(), e))?;
            Ok(())
        })
        .await?;
        Ok(ElementRef::new(selector.clone()))
    }

    async fn click(&self, element: &ElementRef, options: ClickOptions) -> Result<()> {
        self.with_element(element, move |el| {
            if options.force {
                el.call_js_fn(FORCE_CLICK_JS, vec![], false)?;
            } else {
                el.click()?;
            }
            Ok(())
        })
        .await
    }

    async fn fill(&self, element: &ElementRef, text: &str) -> Result<()> {
        let text = text.to_string();
        self.with_element(element, move |el| {
            el.call_js_fn(CLEAR_VALUE_JS, vec![], false)?;
            el.type_into(&text)?;
            Ok(())
        })
        .await
    }

    async fn read_text(&self, element: &ElementRef) -> Result<String> {
        self.with_element(element, |el| el.get_inner_text()).await
    }

    async fn wait_for(&self, selector: &Selector, timeout: Duration) -> Result<ElementRef> {
        let owned = selector.clone();
        self.with_tab(move |tab| {
            let found = match &owned {
                Selector::Css(css) => tab.wait_for_element_with_custom_timeout(css, timeout),
                Selector::XPath(expr) => tab.wait_for_xpath_with_custom_timeout(expr, timeout),
            };
            found
                .map(|_| ())
                .map_err(|e| wait_error(&owned, timeout, e))
        })
        .await?;
        Ok(ElementRef::new(selector.clone()))
    }

    async fn scroll_into_view(&self, element: &ElementRef) -> Result<()> {
        self.with_element(element, |el| {
            el.scroll_into_view()?;
            Ok(())
        })
        .await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.with_tab(|tab| {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(|e| PipelineError::Diagnostic(e.to_string()))
        })
        .await
    }

    async fn wait_network_idle(&self, timeout: Duration) -> Result<()> {
        NavigationManager::wait_for_network_idle(self, timeout).await
    }

    async fn close(&self) -> Result<()> {
        let browser = match self.browser.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(browser) = browser else {
            return Ok(());
        };

        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = tab.close(false) {
                warn!("Tab did not close cleanly: {}", e);
            }
            // dropping the Browser kills the Chrome process
            drop(browser);
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;

    #[test]
    fn test_expired_wait_is_timeout() {
        let selector = Selector::css("#nav-cart");
        let err = wait_error(&selector, Duration::from_millis(3000), anyhow::Error::new(Timeout));
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert!(err.to_string().contains("3000ms"));
    }

    #[test]
    fn test_lost_connection_during_wait_is_unexpected() {
        let selector = Selector::css("#nav-cart");
        let err = wait_error(
            &selector,
            Duration::from_millis(3000),
            anyhow::anyhow!("Unable to make method calls because underlying connection is closed"),
        );
        assert_eq!(err.kind(), FailureKind::Unexpected);
    }
}
