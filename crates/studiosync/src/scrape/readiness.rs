//! Waiting for a client-rendered page to show its content.
//!
//! A strict condition is polled until a deadline; if that passes, a looser
//! condition gets a fixed number of further checks before giving up.

use std::time::Duration;

use scraper::{Html, Selector};
use serde::Serialize;

use super::session::bounded;
use super::ScrapeError;
use crate::browser::BrowserPage;

/// At least `min_count` elements match one of `selectors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyCondition {
    pub label: String,
    pub selectors: Vec<String>,
    pub min_count: usize,
}

impl ReadyCondition {
    pub fn new(label: impl Into<String>, selectors: Vec<String>) -> Self {
        Self {
            label: label.into(),
            selectors,
            min_count: 1,
        }
    }

    pub fn with_min_count(mut self, min_count: usize) -> Self {
        self.min_count = min_count.max(1);
        self
    }

    pub fn holds(&self, html: &str) -> bool {
        let document = Html::parse_document(html);
        self.selectors.iter().any(|s| match Selector::parse(s) {
            Ok(selector) => document.select(&selector).take(self.min_count).count() >= self.min_count,
            Err(_) => false,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "via")]
pub enum ReadyVia {
    Primary,
    Fallback { attempt: u32 },
}

#[derive(Debug, Clone)]
pub struct ReadinessWaiter {
    pub poll_interval: Duration,
    pub fallback_attempts: u32,
    pub fallback_interval: Duration,
}

impl Default for ReadinessWaiter {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            fallback_attempts: 5,
            fallback_interval: Duration::from_secs(2),
        }
    }
}

impl ReadinessWaiter {
    /// Time [`await_ready`](Self::await_ready) spends waiting, page reads aside.
    pub fn budget(&self, timeout: Duration) -> Duration {
        timeout + self.fallback_interval * self.fallback_attempts
    }

    pub async fn await_ready(
        &self,
        page: &mut dyn BrowserPage,
        primary: &ReadyCondition,
        fallback: &ReadyCondition,
        timeout: Duration,
    ) -> Result<ReadyVia, ScrapeError> {
        let primary_poll = async {
            loop {
                let html = page.content().await?;
                if primary.holds(&html) {
                    return Ok::<_, ScrapeError>(());
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        match tokio::time::timeout(timeout, primary_poll).await {
            Ok(Ok(())) => return Ok(ReadyVia::Primary),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                tracing::debug!(
                    condition = %primary.label,
                    timeout_ms = timeout.as_millis() as u64,
                    "primary readiness timed out, polling fallback"
                );
            }
        }

        for attempt in 1..=self.fallback_attempts {
            let html = bounded("ready", timeout, async {
                page.content().await.map_err(ScrapeError::from)
            })
            .await?;
            if fallback.holds(&html) {
                tracing::info!(condition = %fallback.label, attempt, "ready via fallback condition");
                return Ok(ReadyVia::Fallback { attempt });
            }
            if attempt < self.fallback_attempts {
                tokio::time::sleep(self.fallback_interval).await;
            }
        }

        Err(ScrapeError::ContentNotReady {
            condition: primary.label.clone(),
            attempts: self.fallback_attempts,
        })
    }
}
