//! Authoritative list of studios offered by the site.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::Instrument;

use crate::browser::{BrowserError, BrowserLauncher, BrowserPage, LaunchProfile};
use crate::extract::{studio_options, PatternSet, Role};
use crate::registry::StudioInfo;
use crate::scrape::session::{bounded, teardown};
use crate::scrape::{ReadyCondition, ScrapeError, ScrapeSettings};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Studio list unavailable: {0}")]
    Scrape(#[from] ScrapeError),

    #[error("Entry page lists no studios")]
    NoStudios,
}

impl From<BrowserError> for SourceError {
    fn from(e: BrowserError) -> Self {
        Self::Scrape(ScrapeError::Browser(e))
    }
}

#[async_trait]
pub trait StudioSource: Send + Sync {
    async fn list_current_studios(&self) -> Result<Vec<StudioInfo>, SourceError>;
}

/// Reads the studio selector on the site's entry page.
pub struct BrowserStudioSource {
    launcher: Arc<dyn BrowserLauncher>,
    profile: LaunchProfile,
    settings: Arc<ScrapeSettings>,
    patterns: PatternSet,
}

impl BrowserStudioSource {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        profile: LaunchProfile,
        settings: Arc<ScrapeSettings>,
        patterns: PatternSet,
    ) -> Self {
        Self {
            launcher,
            profile,
            settings,
            patterns,
        }
    }

    async fn read_options(&self, page: &mut dyn BrowserPage) -> Result<Vec<StudioInfo>, SourceError> {
        let t = &self.settings.timeouts;
        bounded("navigate", t.navigate, async {
            page.navigate(&self.settings.entry_url).await.map_err(ScrapeError::from)
        })
        .await?;

        let ready = ReadyCondition::new(
            Role::StudioOption.as_str(),
            self.patterns.get(Role::StudioOption).to_vec(),
        );
        let any = ReadyCondition::new(
            Role::AnyContent.as_str(),
            self.patterns.get(Role::AnyContent).to_vec(),
        );
        self.settings.waiter.await_ready(page, &ready, &any, t.ready).await?;

        let html = bounded("read_studios", t.extract, async {
            page.content().await.map_err(ScrapeError::from)
        })
        .await?;
        let (options, pattern) = studio_options(&html, &self.patterns).ok_or(SourceError::NoStudios)?;
        if options.is_empty() {
            return Err(SourceError::NoStudios);
        }
        tracing::debug!(pattern = %pattern, count = options.len(), "studio options read");

        let mut studios: Vec<StudioInfo> = Vec::with_capacity(options.len());
        for option in options {
            if studios.iter().any(|s| s.code == option.code) {
                continue;
            }
            studios.push(StudioInfo {
                code: option.code,
                name: option.name,
                region: option.region,
            });
        }
        Ok(studios)
    }

    async fn list(&self) -> Result<Vec<StudioInfo>, SourceError> {
        let t = &self.settings.timeouts;
        let mut page = bounded("launch", t.launch, async {
            self.launcher.launch(&self.profile).await.map_err(ScrapeError::from)
        })
        .await?;
        let budget = t.navigate + self.settings.waiter.budget(t.ready) + t.extract;
        let result = match tokio::time::timeout(budget, self.read_options(page.as_mut())).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Scrape(ScrapeError::Timeout {
                step: "list_studios",
                secs: budget.as_secs(),
            })),
        };
        teardown(page, t.close).await;
        result
    }
}

#[async_trait]
impl StudioSource for BrowserStudioSource {
    async fn list_current_studios(&self) -> Result<Vec<StudioInfo>, SourceError> {
        let studios = self
            .list()
            .instrument(tracing::info_span!("source.list_studios"))
            .await?;
        tracing::info!(count = studios.len(), "studio list refreshed from site");
        Ok(studios)
    }
}
