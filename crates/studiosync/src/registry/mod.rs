//! Studio work registry.
//!
//! Persisted per-studio batch state with the transitions
//! `unset/completed -> processing -> {completed, failed}` and
//! `failed -> processing` while the retry budget lasts.

mod record;

pub use record::{BatchStatus, StudioInfo, StudioRef, StudioWorkRecord};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::studio_repo::{self, StudioListing};
use crate::db::{format_ts, lease_repo, parse_ts, Database, DatabaseError};

/// Default cap on failed attempts per studio per cycle.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const LEASE_NAME: &str = "batch";

/// Studio counts per state. `remaining` counts studios `next_eligible`
/// could still return.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCounts {
    pub total: u64,
    pub unset: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub exhausted: u64,
    pub remaining: u64,
}

/// What a studio refresh changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Registry over the `studios` table.
#[derive(Clone)]
pub struct StudioRegistry {
    db: Database,
    max_retries: u32,
}

impl StudioRegistry {
    pub fn new(db: Database, max_retries: u32) -> Self {
        Self { db, max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Clears status, retry count and last-processed time of every studio.
    pub fn reset_all(&self) -> Result<usize, DatabaseError> {
        let n = studio_repo::reset_all(&self.db, &format_ts(&Utc::now()))?;
        log::info!("Reset batch state for {} studios", n);
        Ok(n)
    }

    /// The next unprocessed or retryable studio, if any.
    pub fn next_eligible(&self) -> Result<Option<StudioWorkRecord>, DatabaseError> {
        studio_repo::next_eligible(&self.db, self.max_retries)?
            .map(StudioWorkRecord::try_from)
            .transpose()
    }

    pub fn get(&self, code: &str) -> Result<Option<StudioWorkRecord>, DatabaseError> {
        studio_repo::find_by_code(&self.db, code)?
            .map(StudioWorkRecord::try_from)
            .transpose()
    }

    pub fn list(&self) -> Result<Vec<StudioWorkRecord>, DatabaseError> {
        studio_repo::list_all(&self.db)?
            .into_iter()
            .map(StudioWorkRecord::try_from)
            .collect()
    }

    pub fn mark_processing(&self, code: &str) -> Result<(), DatabaseError> {
        let n = studio_repo::set_processing(&self.db, code, &format_ts(&Utc::now()))?;
        if n == 0 {
            log::warn!("mark_processing: studio '{}' not found", code);
        }
        Ok(())
    }

    /// Records the outcome of processing `code`.
    ///
    /// `Failed` increments the retry count and stores `error`; `Completed`
    /// clears both. `Processing` is accepted for symmetry and behaves like
    /// [`mark_processing`](Self::mark_processing).
    pub fn mark_processed(
        &self,
        code: &str,
        status: BatchStatus,
        error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = format_ts(&Utc::now());
        let n = match status {
            BatchStatus::Completed => studio_repo::set_completed(&self.db, code, &now)?,
            BatchStatus::Failed => {
                studio_repo::set_failed(&self.db, code, error, self.max_retries, &now)?
            }
            BatchStatus::Processing => studio_repo::set_processing(&self.db, code, &now)?,
        };
        if n == 0 {
            log::warn!("mark_processed: studio '{}' not found", code);
        } else {
            log::debug!("Studio '{}' marked {}", code, status);
        }
        Ok(())
    }

    pub fn counts(&self) -> Result<RegistryCounts, DatabaseError> {
        let mut counts = RegistryCounts::default();
        for (status, n) in studio_repo::count_by_status(&self.db)? {
            counts.total += n;
            match status.as_deref() {
                None => counts.unset += n,
                Some("processing") => counts.processing += n,
                Some("completed") => counts.completed += n,
                Some("failed") => counts.failed += n,
                Some(other) => {
                    return Err(DatabaseError::InvalidValue {
                        column: "batch_status",
                        value: other.to_string(),
                    })
                }
            }
        }
        counts.exhausted = studio_repo::count_exhausted(&self.db, self.max_retries)?;
        counts.remaining = counts.unset + (counts.failed - counts.exhausted);
        Ok(counts)
    }

    /// Makes the registry match the source's current studio list.
    pub fn reconcile(&self, studios: &[StudioInfo]) -> Result<ReconcileSummary, DatabaseError> {
        let listings: Vec<StudioListing<'_>> = studios
            .iter()
            .map(|s| StudioListing {
                code: &s.code,
                name: &s.name,
                region: s.region.as_deref(),
            })
            .collect();
        let counts = studio_repo::reconcile(&self.db, &listings, &format_ts(&Utc::now()))?;
        log::info!(
            "Studio refresh: {} created, {} updated, {} removed",
            counts.created,
            counts.updated,
            counts.removed
        );
        Ok(ReconcileSummary {
            created: counts.created,
            updated: counts.updated,
            removed: counts.removed,
        })
    }

    /// Fails studios left in `processing` for longer than `older_than`,
    /// which only happens when an invocation died mid-unit.
    pub fn reclaim_stale(&self, older_than: Duration) -> Result<Vec<String>, DatabaseError> {
        let cutoff = format_ts(&(Utc::now() - older_than));
        let stale = studio_repo::find_stale_processing(&self.db, &cutoff)?;
        for code in &stale {
            log::warn!("Studio '{}' was left processing; marking failed", code);
            self.mark_processed(
                code,
                BatchStatus::Failed,
                Some("abandoned by an interrupted invocation"),
            )?;
        }
        Ok(stale)
    }

    /// Takes the batch lease for `holder` for `ttl`. Returns `false` when
    /// another live holder owns it.
    pub fn acquire_lease(&self, holder: &str, ttl: Duration) -> Result<bool, DatabaseError> {
        let now = Utc::now();
        lease_repo::try_acquire(
            &self.db,
            LEASE_NAME,
            holder,
            &format_ts(&now),
            &format_ts(&(now + ttl)),
        )
    }

    pub fn release_lease(&self, holder: &str) -> Result<(), DatabaseError> {
        if !lease_repo::release(&self.db, LEASE_NAME, holder)? {
            log::warn!("Batch lease was no longer held by '{}'", holder);
        }
        Ok(())
    }

    pub fn begin_cycle(&self, studio_count: u64) -> Result<(), DatabaseError> {
        lease_repo::insert_cycle(&self.db, &format_ts(&Utc::now()), studio_count)
    }

    pub fn last_cycle_started(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        lease_repo::last_cycle_started(&self.db)?
            .as_deref()
            .map(|s| parse_ts("started_at", s))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StudioRegistry {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let reg = StudioRegistry::new(db, DEFAULT_MAX_RETRIES);
        reg.reconcile(&[
            StudioInfo {
                code: "EBS".to_string(),
                name: "Ebisu".to_string(),
                region: Some("tokyo".to_string()),
            },
            StudioInfo {
                code: "SJK".to_string(),
                name: "Shinjuku".to_string(),
                region: Some("tokyo".to_string()),
            },
        ])
        .unwrap();
        reg
    }

    #[test]
    fn test_new_studios_are_eligible() {
        let reg = registry();
        let next = reg.next_eligible().unwrap().unwrap();
        assert_eq!(next.code, "EBS");
        assert!(next.batch_status.is_none());
        assert!(next.retry_count.is_none());

        let counts = reg.counts().unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.remaining, 2);
    }

    #[test]
    fn test_processing_is_not_eligible() {
        let reg = registry();
        reg.mark_processing("EBS").unwrap();
        assert_eq!(reg.next_eligible().unwrap().unwrap().code, "SJK");
        assert_eq!(reg.counts().unwrap().processing, 1);
    }

    #[test]
    fn test_failed_increments_and_completed_clears() {
        let reg = registry();
        reg.mark_processing("SJK").unwrap();
        reg.mark_processed("SJK", BatchStatus::Failed, Some("timeout")).unwrap();

        let rec = reg.get("SJK").unwrap().unwrap();
        assert_eq!(rec.batch_status, Some(BatchStatus::Failed));
        assert_eq!(rec.retry_count, Some(1));
        assert_eq!(rec.last_error.as_deref(), Some("timeout"));
        assert!(rec.last_processed.is_some());

        reg.mark_processing("SJK").unwrap();
        reg.mark_processed("SJK", BatchStatus::Completed, None).unwrap();
        let rec = reg.get("SJK").unwrap().unwrap();
        assert_eq!(rec.batch_status, Some(BatchStatus::Completed));
        assert!(rec.retry_count.is_none());
        assert!(rec.last_error.is_none());
    }

    #[test]
    fn test_retry_cap_excludes_studio() {
        let reg = registry();
        reg.mark_processed("EBS", BatchStatus::Completed, None).unwrap();

        for attempt in 1..=DEFAULT_MAX_RETRIES {
            let next = reg.next_eligible().unwrap().unwrap();
            assert_eq!(next.code, "SJK", "attempt {}", attempt);
            reg.mark_processing("SJK").unwrap();
            reg.mark_processed("SJK", BatchStatus::Failed, Some("boom")).unwrap();
        }

        assert!(reg.next_eligible().unwrap().is_none());
        let rec = reg.get("SJK").unwrap().unwrap();
        assert_eq!(rec.retry_count, Some(DEFAULT_MAX_RETRIES));

        // Further failures never push the count past the cap.
        reg.mark_processed("SJK", BatchStatus::Failed, Some("again")).unwrap();
        assert_eq!(reg.get("SJK").unwrap().unwrap().retry_count, Some(DEFAULT_MAX_RETRIES));

        let counts = reg.counts().unwrap();
        assert_eq!(counts.exhausted, 1);
        assert_eq!(counts.remaining, 0);
    }

    #[test]
    fn test_reset_all_makes_everything_eligible() {
        let reg = registry();
        reg.mark_processed("EBS", BatchStatus::Completed, None).unwrap();
        reg.mark_processed("SJK", BatchStatus::Failed, Some("boom")).unwrap();
        reg.mark_processed("SJK", BatchStatus::Failed, Some("boom")).unwrap();
        reg.mark_processed("SJK", BatchStatus::Failed, Some("boom")).unwrap();
        assert!(reg.next_eligible().unwrap().is_none());

        reg.reset_all().unwrap();
        let counts = reg.counts().unwrap();
        assert_eq!(counts.unset, 2);
        assert_eq!(counts.remaining, 2);
        let sjk = reg.get("SJK").unwrap().unwrap();
        assert!(sjk.retry_count.is_none());
        assert!(sjk.last_processed.is_none());
    }

    #[test]
    fn test_reclaim_stale_with_zero_threshold() {
        let reg = registry();
        reg.mark_processing("EBS").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));

        let stale = reg.reclaim_stale(Duration::zero()).unwrap();
        assert_eq!(stale, vec!["EBS".to_string()]);
        let rec = reg.get("EBS").unwrap().unwrap();
        assert_eq!(rec.batch_status, Some(BatchStatus::Failed));
        assert_eq!(rec.retry_count, Some(1));
    }

    #[test]
    fn test_reclaim_stale_ignores_recent() {
        let reg = registry();
        reg.mark_processing("EBS").unwrap();
        assert!(reg.reclaim_stale(Duration::minutes(30)).unwrap().is_empty());
    }

    #[test]
    fn test_lease_round_trip() {
        let reg = registry();
        assert!(reg.acquire_lease("one", Duration::minutes(15)).unwrap());
        assert!(!reg.acquire_lease("two", Duration::minutes(15)).unwrap());
        reg.release_lease("one").unwrap();
        assert!(reg.acquire_lease("two", Duration::minutes(15)).unwrap());
    }

    #[test]
    fn test_cycle_bookkeeping() {
        let reg = registry();
        assert!(reg.last_cycle_started().unwrap().is_none());
        reg.begin_cycle(2).unwrap();
        assert!(reg.last_cycle_started().unwrap().is_some());
    }

    #[test]
    fn test_batch_status_parse() {
        assert_eq!("failed".parse::<BatchStatus>().unwrap(), BatchStatus::Failed);
        assert!("bogus".parse::<BatchStatus>().is_err());
        assert_eq!(BatchStatus::Processing.to_string(), "processing");
    }
}
