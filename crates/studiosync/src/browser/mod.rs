//! Headless browser capability.
//!
//! The scraper only ever talks to [`BrowserLauncher`] and [`BrowserPage`].
//! Pages are read as HTML snapshots and queried locally, so a driver only
//! needs navigation, snapshots, clicks and typing.

#[cfg(feature = "chromium")]
mod chromium;
mod fixture;
mod launch;

#[cfg(feature = "chromium")]
pub use chromium::ChromiumLauncher;
pub use fixture::{FixtureLauncher, FixtureSite, FixtureStats};
pub use launch::{BrowserEnvironment, LaunchProfile};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("No element #{index} for selector '{selector}'")]
    ElementNotFound { selector: String, index: usize },

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("Page already closed")]
    Closed,
}

/// One open page of a launched browser.
#[async_trait]
pub trait BrowserPage: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Serialized DOM of the page as currently rendered.
    async fn content(&mut self) -> Result<String, BrowserError>;

    /// Clicks the `index`-th element matching `selector`.
    async fn click(&mut self, selector: &str, index: usize) -> Result<(), BrowserError>;

    async fn type_text(&mut self, selector: &str, text: &str) -> Result<(), BrowserError>;

    /// Closes the page and its browser. Safe to call twice.
    async fn close(&mut self) -> Result<(), BrowserError>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, profile: &LaunchProfile) -> Result<Box<dyn BrowserPage>, BrowserError>;
}
