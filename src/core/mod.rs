pub mod browser;
pub mod config;
pub mod page;

pub use browser::BrowserLauncher;
pub use config::Config;
pub use page::{ClickOptions, ElementRef, PageHandle, Selector, WaitPolicy};
