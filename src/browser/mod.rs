#[cfg(feature = "chrome")]
pub mod chrome;
pub mod navigation;

#[cfg(feature = "chrome")]
pub use chrome::{ChromeLauncher, ChromePage};
pub use navigation::{NavigationManager, ScriptEvaluator};
