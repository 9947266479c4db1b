//! Chromium driver over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use super::{BrowserError, BrowserLauncher, BrowserPage, LaunchProfile};

#[derive(Debug, Default)]
pub struct ChromiumLauncher;

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, profile: &LaunchProfile) -> Result<Box<dyn BrowserPage>, BrowserError> {
        let mut builder = BrowserConfig::builder().args(profile.args.clone());
        if !profile.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &profile.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "browser handler stopped");
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let mut partial = ChromiumPage {
                    browser: Some(browser),
                    page: None,
                    handler,
                };
                if let Err(close_err) = partial.close().await {
                    tracing::warn!(error = %close_err, "failed to close browser after page error");
                }
                return Err(BrowserError::Launch(e.to_string()));
            }
        };

        tracing::debug!(environment = ?profile.environment, headless = profile.headless, "browser launched");
        Ok(Box::new(ChromiumPage {
            browser: Some(browser),
            page: Some(page),
            handler,
        }))
    }
}

struct ChromiumPage {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: JoinHandle<()>,
}

impl ChromiumPage {
    fn page(&self) -> Result<&Page, BrowserError> {
        self.page.as_ref().ok_or(BrowserError::Closed)
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let page = self.page()?;
        page.goto(url).await.map_err(|e| BrowserError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        page.wait_for_navigation()
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        self.page()?
            .content()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }

    async fn click(&mut self, selector: &str, index: usize) -> Result<(), BrowserError> {
        let elements = self
            .page()?
            .find_elements(selector)
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        let element = elements
            .get(index)
            .ok_or_else(|| BrowserError::ElementNotFound {
                selector: selector.to_string(),
                index,
            })?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let element = self
            .page()?
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound {
                selector: selector.to_string(),
                index: 0,
            })?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?
            .type_str(text)
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        let mut first_error = None;
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                first_error.get_or_insert(BrowserError::Protocol(e.to_string()));
            }
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                first_error.get_or_insert(BrowserError::Protocol(e.to_string()));
            }
            if let Err(e) = browser.wait().await {
                first_error.get_or_insert(BrowserError::Protocol(e.to_string()));
            }
        }
        self.handler.abort();
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
