//! Bounded retries with progressive backoff around whole sessions.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::Instrument;

use super::session::SessionFactory;
use super::{ScrapeError, StudioScraper};
use crate::extract::ExtractionDiagnostics;
use crate::registry::StudioRef;
use crate::store::LessonRecord;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Delays before the 2nd, 3rd, ... attempt. The last value repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::from_secs(&[2, 5, 10, 20, 30])
    }
}

impl BackoffSchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// Delay before retry number `retry` (1 = the second attempt).
    pub fn delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let idx = (retry as usize - 1).min(self.delays.len().saturating_sub(1));
        self.delays.get(idx).copied().unwrap_or(Duration::ZERO)
    }

    pub fn is_non_decreasing(&self) -> bool {
        self.delays.windows(2).all(|pair| pair[0] <= pair[1])
    }

    /// Time spent sleeping when all `max_attempts` attempts fail.
    pub fn total(&self, max_attempts: u32) -> Duration {
        (1..max_attempts).map(|retry| self.delay(retry)).sum()
    }
}

/// Longest one studio can keep the retry loop busy.
pub fn unit_budget(attempt: Duration, backoff: &BackoffSchedule, max_attempts: u32) -> Duration {
    attempt * max_attempts.max(1) + backoff.total(max_attempts)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub attempt: u32,
    #[serde(rename = "delayBeforeMs")]
    pub delay_before: u64,
    pub error: Option<String>,
}

impl AttemptRecord {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_before)
    }
}

/// Result of a successful scrape, with every attempt it took.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeReport {
    pub studio: String,
    pub lessons: Vec<LessonRecord>,
    pub diagnostics: ExtractionDiagnostics,
    pub attempts: Vec<AttemptRecord>,
}

pub struct RetryController {
    sessions: SessionFactory,
    backoff: BackoffSchedule,
    max_attempts: u32,
}

impl RetryController {
    pub fn new(sessions: SessionFactory, backoff: BackoffSchedule, max_attempts: u32) -> Self {
        Self {
            sessions,
            backoff,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn sessions(&self) -> &SessionFactory {
        &self.sessions
    }

    /// Scrapes `studio` with a fresh session per attempt. An attempt that
    /// extracts nothing counts as failed.
    pub async fn run_with_retry(&self, studio: &StudioRef) -> Result<ScrapeReport, ScrapeError> {
        let mut history = Vec::new();
        let mut last = None;

        for attempt in 1..=self.max_attempts {
            let delay = self.backoff.delay(attempt - 1);
            if !delay.is_zero() {
                tracing::info!(studio = %studio.code, attempt, delay_secs = delay.as_secs(), "backing off before retry");
                tokio::time::sleep(delay).await;
            }

            let session = self.sessions.session();
            let outcome = session
                .run(studio)
                .instrument(tracing::info_span!("scrape.attempt", studio = %studio.code, attempt))
                .await
                .and_then(|out| {
                    if out.lessons.is_empty() {
                        Err(ScrapeError::EmptySchedule {
                            studio: studio.code.clone(),
                        })
                    } else {
                        Ok(out)
                    }
                });

            match outcome {
                Ok(out) => {
                    history.push(AttemptRecord {
                        attempt,
                        delay_before: delay.as_millis() as u64,
                        error: None,
                    });
                    return Ok(ScrapeReport {
                        studio: studio.code.clone(),
                        lessons: out.lessons,
                        diagnostics: out.diagnostics,
                        attempts: history,
                    });
                }
                Err(e) => {
                    tracing::warn!(studio = %studio.code, attempt, max = self.max_attempts, error = %e, "scrape attempt failed");
                    history.push(AttemptRecord {
                        attempt,
                        delay_before: delay.as_millis() as u64,
                        error: Some(e.to_string()),
                    });
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last = Some(e);
                }
            }
        }

        let last = last.unwrap_or_else(|| ScrapeError::EmptySchedule {
            studio: studio.code.clone(),
        });
        Err(ScrapeError::RetriesExhausted {
            studio: studio.code.clone(),
            attempts: self.max_attempts,
            last: Box::new(last),
            history,
        })
    }
}

#[async_trait]
impl StudioScraper for RetryController {
    async fn scrape(&self, studio: &StudioRef) -> Result<ScrapeReport, ScrapeError> {
        self.run_with_retry(studio).await
    }
}
