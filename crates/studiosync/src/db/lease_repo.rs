//! Batch lease and cycle bookkeeping.
//!
//! A single named row in `batch_lease` marks the invocation currently
//! allowed to mutate studio state. Expired leases can be taken over.

use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

/// Tries to take the lease `name` for `holder` until `expires_at`.
///
/// Succeeds when the lease is free, expired (`expires_at <= now`), or
/// already held by `holder` (which renews it).
pub fn try_acquire(
    db: &Database,
    name: &str,
    holder: &str,
    now: &str,
    expires_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_tx(|tx| {
        let current: Option<(String, String)> = tx
            .query_row(
                "SELECT holder, expires_at FROM batch_lease WHERE name = ?1",
                params![name],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        if let Some((current_holder, current_expiry)) = &current {
            if current_holder != holder && current_expiry.as_str() > now {
                return Ok(false);
            }
        }

        tx.execute(
            "INSERT INTO batch_lease (name, holder, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
               holder = excluded.holder,
               acquired_at = excluded.acquired_at,
               expires_at = excluded.expires_at",
            params![name, holder, now, expires_at],
        )?;
        Ok(true)
    })
}

/// Releases the lease if `holder` still owns it. Returns whether a row was removed.
pub fn release(db: &Database, name: &str, holder: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "DELETE FROM batch_lease WHERE name = ?1 AND holder = ?2",
            params![name, holder],
        )?;
        Ok(n > 0)
    })
}

/// Records the start of a new cycle.
pub fn insert_cycle(db: &Database, started_at: &str, studio_count: u64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO batch_cycles (started_at, studio_count) VALUES (?1, ?2)",
            params![started_at, studio_count],
        )?;
        Ok(())
    })
}

/// Returns when the most recent cycle started, if any.
pub fn last_cycle_started(db: &Database) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let started: Option<String> = conn.query_row(
            "SELECT MAX(started_at) FROM batch_cycles",
            [],
            |r| r.get(0),
        )?;
        Ok(started)
    })
}
