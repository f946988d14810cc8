//! In-memory stand-ins for the browser, used by the test suite.

use crate::core::config::BrowserConfig;
use crate::core::{BrowserLauncher, ClickOptions, Config, ElementRef, PageHandle, Selector, WaitPolicy};
use crate::errors::{PipelineError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Navigate(String),
    Click { selector: Selector, force: bool },
    Fill { selector: Selector, text: String },
    WaitFor { selector: Selector, timeout_ms: u64 },
    ScrollIntoView(Selector),
    Screenshot,
    NetworkIdle,
    Close,
}

/// Shared view of what happened to every page cloned from one script.
#[derive(Debug, Clone, Default)]
pub struct PageProbe {
    events: Arc<Mutex<Vec<PageEvent>>>,
    closes: Arc<AtomicUsize>,
}

impl PageProbe {
    pub fn events(&self) -> Vec<PageEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn clicked(&self, selector: &Selector) -> Option<bool> {
        self.events().into_iter().find_map(|event| match event {
            PageEvent::Click { selector: s, force } if &s == selector => Some(force),
            _ => None,
        })
    }

    pub fn filled(&self, selector: &Selector) -> Option<String> {
        self.events().into_iter().find_map(|event| match event {
            PageEvent::Fill { selector: s, text } if &s == selector => Some(text),
            _ => None,
        })
    }

    /// Timeout passed to the first wait on `selector`
    pub fn waited_for(&self, selector: &Selector) -> Option<u64> {
        self.events().into_iter().find_map(|event| match event {
            PageEvent::WaitFor { selector: s, timeout_ms } if &s == selector => Some(timeout_ms),
            _ => None,
        })
    }

    pub fn fill_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, PageEvent::Fill { .. }))
            .count()
    }

    fn record(&self, event: PageEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A fake page with a fixed set of elements. Waits resolve immediately:
/// present selectors succeed, absent ones time out, hanging ones never return.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    elements: HashMap<Selector, String>,
    hanging: HashSet<Selector>,
    failing_clicks: HashSet<Selector>,
    fail_screenshots: bool,
    probe: PageProbe,
}

impl ScriptedPage {
    pub const SCREENSHOT_BYTES: &'static [u8] = b"\x89PNG\r\n\x1a\nscripted";

    pub fn new() -> Self {
        Self::default()
    }

    /// Every element the default flow touches, with the account link reading
    /// as signed in or signed out.
    pub fn storefront(config: &Config, signed_in: bool) -> Self {
        let locators = &config.site.locators;
        let account_text = if signed_in {
            "Hola, Ana\nCuenta y Listas"
        } else {
            "Hola, identifícate\nCuenta y Listas"
        };

        Self::new()
            .with_element(locators.login_link.clone(), account_text)
            .with_element(locators.identifier_input.clone(), "")
            .with_element(locators.continue_button.clone(), "Continuar")
            .with_element(locators.secret_input.clone(), "")
            .with_element(locators.submit_button.clone(), "Iniciar sesión")
            .with_element(locators.root_menu.clone(), "Todo")
            .with_element(locators.top_category.clone(), "Electrónicos")
            .with_element(locators.second_category.clone(), "TV y Video")
            .with_element(locators.leaf_category.clone(), "Televisores")
            .with_element(
                Selector::link_with_text(&config.site.size_filter_label),
                config.site.size_filter_label.clone(),
            )
            .with_element(locators.product_item.clone(), "Pantalla 65\" 4K")
            .with_element(locators.add_to_cart_button.clone(), "Agregar al carrito")
            .with_element(locators.cart_button.clone(), "Carrito")
            .with_element(locators.cart_page.clone(), "Carrito")
            .with_element(locators.checkout_button.clone(), "Proceder al pago")
    }

    pub fn with_element(mut self, selector: Selector, text: impl Into<String>) -> Self {
        self.elements.insert(selector, text.into());
        self
    }

    pub fn without(mut self, selector: &Selector) -> Self {
        self.elements.remove(selector);
        self
    }

    pub fn with_hanging(mut self, selector: Selector) -> Self {
        self.hanging.insert(selector);
        self
    }

    pub fn with_failing_click(mut self, selector: Selector) -> Self {
        self.failing_clicks.insert(selector);
        self
    }

    pub fn with_failing_screenshots(mut self) -> Self {
        self.fail_screenshots = true;
        self
    }

    pub fn probe(&self) -> PageProbe {
        self.probe.clone()
    }

    fn present(&self, selector: &Selector) -> Result<()> {
        if self.elements.contains_key(selector) {
            Ok(())
        } else {
            Err(PipelineError::interaction(
                selector.to_string(),
                "no element matches selector",
            ))
        }
    }
}

#[async_trait]
impl PageHandle for ScriptedPage {
    async fn navigate(&self, url: &str, _wait: WaitPolicy, _timeout: Duration) -> Result<()> {
        self.probe.record(PageEvent::Navigate(url.to_string()));
        Ok(())
    }

    async fn locate(&self, selector: &Selector) -> Result<ElementRef> {
        self.present(selector)?;
        Ok(ElementRef::new(selector.clone()))
    }

    async fn click(&self, element: &ElementRef, options: ClickOptions) -> Result<()> {
        self.present(&element.selector)?;
        if self.failing_clicks.contains(&element.selector) {
            return Err(PipelineError::interaction(
                element.to_string(),
                "element is covered by another element",
            ));
        }
        self.probe.record(PageEvent::Click {
            selector: element.selector.clone(),
            force: options.force,
        });
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, text: &str) -> Result<()> {
        self.present(&element.selector)?;
        self.probe.record(PageEvent::Fill {
            selector: element.selector.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn read_text(&self, element: &ElementRef) -> Result<String> {
        self.present(&element.selector)?;
        Ok(self.elements[&element.selector].clone())
    }

    async fn wait_for(&self, selector: &Selector, timeout: Duration) -> Result<ElementRef> {
        self.probe.record(PageEvent::WaitFor {
            selector: selector.clone(),
            timeout_ms: timeout.as_millis() as u64,
        });
        if self.hanging.contains(selector) {
            std::future::pending::<()>().await;
        }
        if self.elements.contains_key(selector) {
            Ok(ElementRef::new(selector.clone()))
        } else {
            Err(PipelineError::timeout(
                selector.to_string(),
                timeout.as_millis() as u64,
            ))
        }
    }

    async fn scroll_into_view(&self, element: &ElementRef) -> Result<()> {
        self.present(&element.selector)?;
        self.probe
            .record(PageEvent::ScrollIntoView(element.selector.clone()));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        if self.fail_screenshots {
            return Err(PipelineError::Diagnostic("renderer crashed".to_string()));
        }
        self.probe.record(PageEvent::Screenshot);
        Ok(Self::SCREENSHOT_BYTES.to_vec())
    }

    async fn wait_network_idle(&self, _timeout: Duration) -> Result<()> {
        self.probe.record(PageEvent::NetworkIdle);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        self.probe.record(PageEvent::Close);
        Ok(())
    }
}

/// Hands out clones of one scripted page and counts how often it was asked to.
#[derive(Debug, Clone)]
pub struct ScriptedLauncher {
    template: ScriptedPage,
    opens: Arc<AtomicUsize>,
    launch_error: Option<String>,
    launch_hangs: bool,
    last_headless: Arc<Mutex<Option<bool>>>,
}

impl ScriptedLauncher {
    pub fn new(template: ScriptedPage) -> Self {
        Self {
            template,
            opens: Arc::new(AtomicUsize::new(0)),
            launch_error: None,
            launch_hangs: false,
            last_headless: Arc::new(Mutex::new(None)),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            launch_error: Some(reason.into()),
            ..Self::new(ScriptedPage::new())
        }
    }

    /// A launcher whose browser never finishes starting.
    pub fn hanging() -> Self {
        Self {
            launch_hangs: true,
            ..Self::new(ScriptedPage::new())
        }
    }

    pub fn probe(&self) -> PageProbe {
        self.template.probe()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn last_headless(&self) -> Option<bool> {
        *self.last_headless.lock().unwrap()
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    type Page = ScriptedPage;

    async fn open(&self, _config: &BrowserConfig, headless: bool) -> Result<ScriptedPage> {
        if self.launch_hangs {
            std::future::pending::<()>().await;
        }
        if let Some(reason) = &self.launch_error {
            return Err(PipelineError::LaunchFailed(reason.clone()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        *self.last_headless.lock().unwrap() = Some(headless);
        Ok(self.template.clone())
    }
}
