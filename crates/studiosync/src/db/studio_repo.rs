//! Studio repository: reads and writes for the `studios` table.
//!
//! Rows carry plain strings; [`crate::registry`] turns them into typed
//! records and owns the state-machine rules.

use std::collections::HashSet;

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw studio row from the database.
#[derive(Debug, Clone)]
pub struct StudioRow {
    pub code: String,
    pub name: String,
    pub region: Option<String>,
    pub batch_status: Option<String>,
    pub retry_count: Option<u32>,
    pub last_error: Option<String>,
    pub last_processed: Option<String>,
    pub updated_at: String,
}

impl StudioRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            code: row.get("code")?,
            name: row.get("name")?,
            region: row.get("region")?,
            batch_status: row.get("batch_status")?,
            retry_count: row.get("retry_count")?,
            last_error: row.get("last_error")?,
            last_processed: row.get("last_processed")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Input for [`reconcile`]: one studio as listed by the source.
#[derive(Debug, Clone)]
pub struct StudioListing<'a> {
    pub code: &'a str,
    pub name: &'a str,
    pub region: Option<&'a str>,
}

/// Row counts changed by [`reconcile`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Inserts a studio with no batch state.
pub fn insert(db: &Database, row: &StudioRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO studios (code, name, region, batch_status, retry_count, last_error,
             last_processed, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.code,
                row.name,
                row.region,
                row.batch_status,
                row.retry_count,
                row.last_error,
                row.last_processed,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a studio by its code.
pub fn find_by_code(db: &Database, code: &str) -> Result<Option<StudioRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM studios WHERE code = ?1",
                params![code],
                StudioRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Lists every studio ordered by code.
pub fn list_all(db: &Database) -> Result<Vec<StudioRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM studios ORDER BY code")?;
        let rows = stmt
            .query_map([], StudioRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns the next studio to process: unset first, then failed studios
/// whose retry count is still below `max_retries`.
pub fn next_eligible(db: &Database, max_retries: u32) -> Result<Option<StudioRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM studios
                 WHERE batch_status IS NULL
                    OR (batch_status = 'failed' AND COALESCE(retry_count, 0) < ?1)
                 ORDER BY CASE WHEN batch_status IS NULL THEN 0 ELSE 1 END, code
                 LIMIT 1",
                params![max_retries],
                StudioRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Counts studios per batch status. `None` is the unset status.
pub fn count_by_status(db: &Database) -> Result<Vec<(Option<String>, u64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT batch_status, COUNT(*) FROM studios GROUP BY batch_status")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts failed studios whose retry budget is spent.
pub fn count_exhausted(db: &Database, max_retries: u32) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM studios
             WHERE batch_status = 'failed' AND COALESCE(retry_count, 0) >= ?1",
            params![max_retries],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Clears batch state for every studio. `last_error` is kept for operators.
pub fn reset_all(db: &Database, updated_at: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "UPDATE studios SET batch_status = NULL, retry_count = NULL,
             last_processed = NULL, updated_at = ?1",
            params![updated_at],
        )?;
        Ok(n)
    })
}

/// Moves a studio into `processing`.
pub fn set_processing(db: &Database, code: &str, updated_at: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "UPDATE studios SET batch_status = 'processing', updated_at = ?2 WHERE code = ?1",
            params![code, updated_at],
        )?;
        Ok(n)
    })
}

/// Moves a studio into `completed`, clearing its retry count and error.
pub fn set_completed(db: &Database, code: &str, now: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "UPDATE studios SET batch_status = 'completed', retry_count = NULL,
             last_error = NULL, last_processed = ?2, updated_at = ?2
             WHERE code = ?1",
            params![code, now],
        )?;
        Ok(n)
    })
}

/// Moves a studio into `failed`, incrementing its retry count (clamped at
/// `max_retries`) and recording the error.
pub fn set_failed(
    db: &Database,
    code: &str,
    error: Option<&str>,
    max_retries: u32,
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "UPDATE studios SET batch_status = 'failed',
             retry_count = MIN(COALESCE(retry_count, 0) + 1, ?3),
             last_error = ?2, last_processed = ?4, updated_at = ?4
             WHERE code = ?1",
            params![code, error, max_retries, now],
        )?;
        Ok(n)
    })
}

/// Returns the codes of studios stuck in `processing` since before `cutoff`.
pub fn find_stale_processing(db: &Database, cutoff: &str) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT code FROM studios
             WHERE batch_status = 'processing' AND updated_at < ?1
             ORDER BY code",
        )?;
        let codes = stmt
            .query_map(params![cutoff], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(codes)
    })
}

/// Makes the `studios` table match `listings` in one transaction: new codes
/// are inserted, changed names or regions are updated, and codes missing
/// from the listing are deleted.
pub fn reconcile(
    db: &Database,
    listings: &[StudioListing<'_>],
    now: &str,
) -> Result<ReconcileCounts, DatabaseError> {
    db.with_tx(|tx| {
        let mut counts = ReconcileCounts::default();
        let mut seen = HashSet::with_capacity(listings.len());

        for listing in listings {
            if !seen.insert(listing.code) {
                continue;
            }

            let existing: Option<(String, Option<String>)> = tx
                .query_row(
                    "SELECT name, region FROM studios WHERE code = ?1",
                    params![listing.code],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;

            match existing {
                None => {
                    tx.execute(
                        "INSERT INTO studios (code, name, region, updated_at) VALUES (?1, ?2, ?3, ?4)",
                        params![listing.code, listing.name, listing.region, now],
                    )?;
                    counts.created += 1;
                }
                Some((name, region))
                    if name != listing.name || region.as_deref() != listing.region =>
                {
                    tx.execute(
                        "UPDATE studios SET name = ?2, region = ?3, updated_at = ?4 WHERE code = ?1",
                        params![listing.code, listing.name, listing.region, now],
                    )?;
                    counts.updated += 1;
                }
                Some(_) => {}
            }
        }

        let stored: Vec<String> = {
            let mut stmt = tx.prepare("SELECT code FROM studios")?;
            let codes = stmt
                .query_map([], |r| r.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            codes
        };
        for code in stored.iter().filter(|c| !seen.contains(c.as_str())) {
            tx.execute("DELETE FROM studios WHERE code = ?1", params![code])?;
            counts.removed += 1;
        }

        Ok(counts)
    })
}
