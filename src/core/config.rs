use crate::core::page::Selector;
use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub browser: BrowserConfig,
    pub timeouts: TimeoutConfig,
    pub diagnostics: DiagnosticsConfig,
    /// Hard ceiling for a whole run; `None` lets the per-step timeouts decide.
    pub run_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub locators: Locators,
    /// Phrases shown on the account link when nobody is signed in.
    pub signed_out_phrases: Vec<String>,
    /// Visible text of the size filter link on the leaf category page.
    pub size_filter_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Locators {
    pub login_link: Selector,
    pub identifier_input: Selector,
    pub continue_button: Selector,
    pub secret_input: Selector,
    pub submit_button: Selector,
    pub root_menu: Selector,
    pub top_category: Selector,
    pub second_category: Selector,
    pub leaf_category: Selector,
    pub product_item: Selector,
    pub add_to_cart_button: Selector,
    pub upsell_dismiss: Selector,
    pub cart_button: Selector,
    pub cart_page: Selector,
    pub checkout_button: Selector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub disable_images: bool,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub navigation_ms: u64,
    pub session_detect_ms: u64,
    pub login_link_ms: u64,
    pub identifier_ms: u64,
    pub secret_ms: u64,
    pub category_ms: u64,
    pub size_filter_ms: u64,
    pub product_list_ms: u64,
    pub add_to_cart_ms: u64,
    pub upsell_ms: u64,
    pub cart_ms: u64,
    pub checkout_ms: u64,
    pub network_idle_ms: u64,
    /// Fixed pause used only where no observable post-condition exists.
    pub settle_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub output_dir: PathBuf,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.site.base_url).map_err(|e| {
            PipelineError::Configuration(format!("invalid base_url '{}': {}", self.site.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PipelineError::Configuration(format!(
                "base_url must be http(s), got '{}'",
                url.scheme()
            )));
        }
        if self.site.signed_out_phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(PipelineError::Configuration(
                "signed_out_phrases must contain at least one phrase".to_string(),
            ));
        }
        self.timeouts.validate()?;
        if self.run_timeout_ms == Some(0) {
            return Err(PipelineError::Configuration(
                "run_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }
}

impl TimeoutConfig {
    fn validate(&self) -> Result<()> {
        let named = [
            ("navigation_ms", self.navigation_ms),
            ("session_detect_ms", self.session_detect_ms),
            ("login_link_ms", self.login_link_ms),
            ("identifier_ms", self.identifier_ms),
            ("secret_ms", self.secret_ms),
            ("category_ms", self.category_ms),
            ("size_filter_ms", self.size_filter_ms),
            ("product_list_ms", self.product_list_ms),
            ("add_to_cart_ms", self.add_to_cart_ms),
            ("upsell_ms", self.upsell_ms),
            ("cart_ms", self.cart_ms),
            ("checkout_ms", self.checkout_ms),
            ("network_idle_ms", self.network_idle_ms),
        ];
        match named.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(PipelineError::Configuration(format!(
                "timeout {} must be greater than zero",
                name
            ))),
            None => Ok(()),
        }
    }
}

pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.amazon.com.mx/".to_string(),
            locators: Locators::default(),
            signed_out_phrases: vec!["identifícate".to_string(), "sign in".to_string()],
            size_filter_label: "56 pulgadas o más".to_string(),
        }
    }
}

impl Default for Locators {
    fn default() -> Self {
        Self {
            login_link: Selector::css("#nav-link-accountList"),
            identifier_input: Selector::css("#ap_email"),
            continue_button: Selector::css("#continue"),
            secret_input: Selector::css("#ap_password"),
            submit_button: Selector::css("#signInSubmit"),
            root_menu: Selector::css("#nav-hamburger-menu"),
            top_category: Selector::xpath(
                "//a[contains(@class, 'hmenu-item')][contains(normalize-space(.), 'Electrónicos')]",
            ),
            second_category: Selector::xpath(
                "//ul[contains(@class, 'hmenu-visible')]//a[contains(@class, 'hmenu-item')][contains(normalize-space(.), 'TV y Video')]",
            ),
            leaf_category: Selector::xpath(
                "//ul[contains(@class, 'hmenu-visible')]//a[contains(@class, 'hmenu-item')][normalize-space(.)='Televisores']",
            ),
            product_item: Selector::css(
                "div[data-component-type='s-search-result'] h2 a",
            ),
            add_to_cart_button: Selector::css("#add-to-cart-button"),
            upsell_dismiss: Selector::css("#attachSiNoCoverage"),
            cart_button: Selector::css("#nav-cart"),
            cart_page: Selector::css("#sc-active-cart"),
            checkout_button: Selector::css("input[name='proceedToRetailCheckout']"),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            disable_images: false,
            args: vec!["--start-maximized".to_string()],
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1366,
            height: 900,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_ms: 30000,
            session_detect_ms: 10000,
            login_link_ms: 15000,
            identifier_ms: 10000,
            secret_ms: 10000,
            category_ms: 30000,
            size_filter_ms: 10000,
            product_list_ms: 15000,
            add_to_cart_ms: 10000,
            upsell_ms: 3000,
            cart_ms: 30000,
            checkout_ms: 15000,
            network_idle_ms: 30000,
            settle_delay_ms: 2000,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("screenshots"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        tokio_test::assert_ok!(config.validate());
        assert_eq!(config.timeouts.upsell_ms, 3000);
        assert!(config.run_timeout().is_none());
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "site": {{ "base_url": "https://shop.example.com/" }},
                "timeouts": {{ "upsell_ms": 1500 }},
                "run_timeout_ms": 120000
            }}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.site.base_url, "https://shop.example.com/");
        assert_eq!(config.site.size_filter_label, "56 pulgadas o más");
        assert_eq!(config.timeouts.upsell_ms, 1500);
        assert_eq!(config.timeouts.identifier_ms, 10000);
        assert_eq!(config.run_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.site.locators.cart_button, Selector::css("#nav-cart"));
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let mut config = Config::default();
        config.site.base_url = "not a url".to_string();
        tokio_test::assert_err!(config.validate());

        config.site.base_url = "ftp://example.com/".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http(s)"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = Config::default();
        config.timeouts.checkout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("checkout_ms"));
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = Config::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
