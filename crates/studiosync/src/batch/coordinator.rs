use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::Instrument;

use super::progress::BatchProgress;
use crate::db::DatabaseError;
use crate::recovery::{
    ErrorKind, Operation, RecoveryContext, RecoveryCoordinator, RecoveryResult, SystemState,
};
use crate::registry::{BatchStatus, ReconcileSummary, RegistryCounts, StudioRegistry, StudioWorkRecord};
use crate::scrape::{ScrapeError, StudioScraper};
use crate::source::{SourceError, StudioSource};
use crate::store::LessonStore;

/// Only registry failures escape the coordinator.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Registry error: {0}")]
    Registry(#[from] DatabaseError),
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Identifies this process as lease holder.
    pub holder: String,
    pub lease_ttl: Duration,
    /// `processing` records older than this are treated as abandoned.
    pub stale_after: Duration,
    pub min_cycle_interval: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            holder: uuid::Uuid::new_v4().to_string(),
            lease_ttl: Duration::minutes(30),
            stale_after: Duration::minutes(30),
            min_cycle_interval: Duration::hours(12),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum RefreshResult {
    Refreshed(ReconcileSummary),
    /// Source failed; the known studio list was kept.
    KeptExisting { detail: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BatchAction {
    CycleReset {
        reset: usize,
        refresh: RefreshResult,
    },
    Processed {
        studio: String,
        status: BatchStatus,
        lessons: usize,
        attempts: usize,
        error: Option<String>,
        recovery: Option<RecoveryResult>,
    },
    Idle {
        reason: String,
    },
    LeaseBusy,
    RefreshAborted {
        detail: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub trigger_next: bool,
    pub progress: BatchProgress,
    pub action: BatchAction,
}

pub struct BatchCoordinator {
    registry: StudioRegistry,
    scraper: Arc<dyn StudioScraper>,
    store: Arc<dyn LessonStore>,
    source: Arc<dyn StudioSource>,
    recovery: RecoveryCoordinator,
    settings: BatchSettings,
}

impl BatchCoordinator {
    pub fn new(
        registry: StudioRegistry,
        scraper: Arc<dyn StudioScraper>,
        store: Arc<dyn LessonStore>,
        source: Arc<dyn StudioSource>,
        recovery: RecoveryCoordinator,
        settings: BatchSettings,
    ) -> Self {
        Self {
            registry,
            scraper,
            store,
            source,
            recovery,
            settings,
        }
    }

    pub fn registry(&self) -> &StudioRegistry {
        &self.registry
    }

    /// Does one step of the current cycle: either starts a new cycle or
    /// processes one studio. Callers re-invoke while `trigger_next` is set.
    pub async fn process_next(&self) -> Result<BatchOutcome, BatchError> {
        let holder = &self.settings.holder;
        if !self.registry.acquire_lease(holder, self.settings.lease_ttl)? {
            tracing::info!("batch lease held by another invocation");
            return Ok(BatchOutcome {
                trigger_next: false,
                progress: self.registry.counts()?.into(),
                action: BatchAction::LeaseBusy,
            });
        }

        let result = self
            .process_locked()
            .instrument(tracing::info_span!("batch.process_next", holder = %holder))
            .await;

        match self.registry.release_lease(holder) {
            Ok(()) => result,
            Err(e) if result.is_ok() => Err(e.into()),
            Err(e) => {
                tracing::error!(error = %e, "failed to release batch lease");
                result
            }
        }
    }

    async fn process_locked(&self) -> Result<BatchOutcome, BatchError> {
        let reclaimed = self.registry.reclaim_stale(self.settings.stale_after)?;
        if !reclaimed.is_empty() {
            tracing::warn!(count = reclaimed.len(), "reclaimed abandoned studios");
        }

        let counts = self.registry.counts()?;
        if counts.remaining == 0 && counts.processing == 0 {
            return self.start_cycle(counts).await;
        }

        let Some(record) = self.registry.next_eligible()? else {
            return self.finish(
                BatchAction::Idle {
                    reason: format!("{} studios still processing", counts.processing),
                },
                false,
            );
        };

        let action = self.process_unit(record).await?;

        match self.store.purge_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(purged = n, "expired lessons purged"),
            Err(e) => tracing::warn!(error = %e, "failed to purge expired lessons"),
        }

        self.finish(action, true)
    }

    /// `trigger_next` is set when `more` holds and eligible studios remain.
    fn finish(&self, action: BatchAction, more: bool) -> Result<BatchOutcome, BatchError> {
        let counts = self.registry.counts()?;
        Ok(BatchOutcome {
            trigger_next: more && counts.remaining > 0,
            progress: counts.into(),
            action,
        })
    }

    async fn start_cycle(&self, counts: RegistryCounts) -> Result<BatchOutcome, BatchError> {
        if let Some(last) = self.registry.last_cycle_started()? {
            let since = Utc::now() - last;
            if since < self.settings.min_cycle_interval {
                tracing::debug!(minutes_since = since.num_minutes(), "cycle complete; next cycle not due");
                return self.finish(
                    BatchAction::Idle {
                        reason: "cycle complete; next cycle not due yet".to_string(),
                    },
                    false,
                );
            }
        }

        tracing::info!(studios = counts.total, "starting new cycle");
        let refresh = match self.source.list_current_studios().await {
            Ok(studios) => {
                let reset = self.registry.reset_all()?;
                let summary = self.registry.reconcile(&studios)?;
                (reset, RefreshResult::Refreshed(summary))
            }
            Err(e) => {
                let kind = match &e {
                    SourceError::Scrape(inner) => inner.kind(),
                    SourceError::NoStudios => ErrorKind::Source,
                };
                let verdict = self.recovery.attempt_recovery(&RecoveryContext {
                    kind,
                    message: e.to_string(),
                    operation: Operation::RefreshStudios,
                    retry_count: 0,
                    max_retries: self.registry.max_retries(),
                    state: SystemState {
                        total_studios: counts.total,
                        failed_studios: counts.failed,
                    },
                });
                if !verdict.success {
                    tracing::error!(detail = %verdict.detail, "cycle aborted");
                    return self.finish(
                        BatchAction::RefreshAborted {
                            detail: verdict.detail,
                        },
                        false,
                    );
                }
                let reset = self.registry.reset_all()?;
                (
                    reset,
                    RefreshResult::KeptExisting {
                        detail: verdict.detail,
                    },
                )
            }
        };

        let (reset, refresh) = refresh;
        self.registry.begin_cycle(self.registry.counts()?.total)?;
        self.finish(BatchAction::CycleReset { reset, refresh }, true)
    }

    async fn process_unit(&self, record: StudioWorkRecord) -> Result<BatchAction, BatchError> {
        let studio = record.studio_ref();
        self.registry.mark_processing(&studio.code)?;

        let scraped = self
            .scraper
            .scrape(&studio)
            .instrument(tracing::info_span!("batch.unit", studio = %studio.code))
            .await;

        let (kind, message, operation, attempts) = match scraped {
            Ok(report) => {
                let attempts = report.attempts.len();
                match self.store.put_many(&report.lessons).await {
                    Ok(stored) => {
                        self.registry
                            .mark_processed(&studio.code, BatchStatus::Completed, None)?;
                        tracing::info!(studio = %studio.code, lessons = stored, attempts, "studio completed");
                        return Ok(BatchAction::Processed {
                            studio: studio.code,
                            status: BatchStatus::Completed,
                            lessons: stored,
                            attempts,
                            error: None,
                            recovery: None,
                        });
                    }
                    Err(e) => (ErrorKind::Store, e.to_string(), Operation::PersistLessons, attempts),
                }
            }
            Err(e) => {
                let attempts = match &e {
                    ScrapeError::RetriesExhausted { history, .. } => history.len(),
                    _ => 1,
                };
                (e.kind(), e.to_string(), Operation::ScrapeStudio, attempts)
            }
        };

        let counts = self.registry.counts()?;
        let verdict = self.recovery.attempt_recovery(&RecoveryContext {
            kind,
            message: message.clone(),
            operation,
            retry_count: record.retry_count.unwrap_or(0),
            max_retries: self.registry.max_retries(),
            state: SystemState {
                total_studios: counts.total,
                failed_studios: counts.failed,
            },
        });

        let status = if verdict.success && !verdict.fallback_used {
            self.registry
                .mark_processed(&studio.code, BatchStatus::Completed, None)?;
            BatchStatus::Completed
        } else {
            self.registry
                .mark_processed(&studio.code, BatchStatus::Failed, Some(&verdict.detail))?;
            BatchStatus::Failed
        };
        tracing::warn!(studio = %studio.code, status = %status, error = %message, "studio not scraped");

        Ok(BatchAction::Processed {
            studio: studio.code,
            status,
            lessons: 0,
            attempts,
            error: Some(message),
            recovery: Some(verdict),
        })
    }
}
