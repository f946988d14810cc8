use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How an element is located on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    Css(String),
    XPath(String),
}

impl Selector {
    pub fn css(selector: impl Into<String>) -> Self {
        Selector::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Selector::XPath(expr.into())
    }

    /// A link whose visible text contains `text`.
    pub fn link_with_text(text: &str) -> Self {
        Selector::XPath(format!(
            "//a[contains(normalize-space(.), {})]",
            xpath_literal(text)
        ))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(css) => f.write_str(css),
            Selector::XPath(expr) => write!(f, "xpath={}", expr),
        }
    }
}

// XPath 1.0 has no escape syntax, so quotes are handled with concat().
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    let parts: Vec<String> = text
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// A located element. Holds no live browser state; every operation re-resolves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub selector: Selector,
}

impl ElementRef {
    pub fn new(selector: Selector) -> Self {
        Self { selector }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.selector, f)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickOptions {
    /// Dispatch the click on the element directly, skipping overlay hit-testing.
    pub force: bool,
}

impl ClickOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    #[default]
    DomContentLoaded,
    Load,
    NetworkIdle,
}

/// A single controllable browser page.
///
/// Every wait takes its own timeout; running out of time is reported as
/// `PipelineError::Timeout`, never as a silent success.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate to a URL and wait according to `wait`
    async fn navigate(&self, url: &str, wait: WaitPolicy, timeout: Duration) -> Result<()>;

    /// Resolve a selector that is expected to be present right now
    async fn locate(&self, selector: &Selector) -> Result<ElementRef>;

    async fn click(&self, element: &ElementRef, options: ClickOptions) -> Result<()>;

    /// Replace the element's value with `text`
    async fn fill(&self, element: &ElementRef, text: &str) -> Result<()>;

    async fn read_text(&self, element: &ElementRef) -> Result<String>;

    /// Wait until the selector matches an element
    async fn wait_for(&self, selector: &Selector, timeout: Duration) -> Result<ElementRef>;

    async fn scroll_into_view(&self, element: &ElementRef) -> Result<()>;

    /// Capture the viewport as PNG bytes
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Wait until no network activity has been seen for a short quiet window
    async fn wait_network_idle(&self, timeout: Duration) -> Result<()>;

    /// Tear down the page and the browser behind it
    async fn close(&self) -> Result<()>;
}
