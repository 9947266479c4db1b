//! Schema migrations.
//!
//! Each migration runs in its own transaction together with the row that
//! records it in `_migrations`, so a failed step leaves nothing half
//! applied. Column additions check `PRAGMA table_info` first because a
//! column added by hand would otherwise make `ALTER TABLE` fail.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{params, Connection, Transaction};

use super::error::DatabaseError;
use super::format_ts;

enum Step {
    Sql(&'static str),
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
}

const SCHEMA: &[(u32, &str, Step)] = &[
    (1, "studios", Step::Sql(include_str!("sql/001_create_studios.sql"))),
    (2, "lessons", Step::Sql(include_str!("sql/002_create_lessons.sql"))),
    (3, "batch_lease", Step::Sql(include_str!("sql/003_create_batch_lease.sql"))),
    (4, "batch_cycles", Step::Sql(include_str!("sql/004_create_batch_cycles.sql"))),
    (
        5,
        "lessons.status_text",
        Step::AddColumn {
            table: "lessons",
            column: "status_text",
            definition: "TEXT",
        },
    ),
];

/// Brings the schema up to date. Safe to call on every open.
pub fn run_all(conn: &mut Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;
    let applied = applied_versions(conn)?;

    for (version, name, step) in SCHEMA {
        if applied.contains(version) {
            continue;
        }
        let tx = conn.transaction()?;
        apply(&tx, step).map_err(|source| DatabaseError::Migration {
            version: *version,
            name: *name,
            source,
        })?;
        tx.execute(
            "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![version, name, format_ts(&Utc::now())],
        )?;
        tx.commit()?;
        log::info!("Applied schema migration v{} ({})", version, name);
    }
    Ok(())
}

fn applied_versions(conn: &Connection) -> Result<HashSet<u32>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT version FROM _migrations")?;
    let versions = stmt
        .query_map([], |row| row.get::<_, u32>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(versions)
}

fn apply(tx: &Transaction<'_>, step: &Step) -> Result<(), rusqlite::Error> {
    match step {
        Step::Sql(sql) => tx.execute_batch(sql),
        Step::AddColumn {
            table,
            column,
            definition,
        } => {
            if has_column(tx, table, column)? {
                log::debug!("Column {}.{} already present", table, column);
                return Ok(());
            }
            tx.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {};",
                table, column, definition
            ))
        }
    }
}

/// `table` is always one of the compile-time names in [`SCHEMA`].
fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        run_all(&mut conn).unwrap();
        conn
    }

    fn recorded(conn: &Connection) -> u32 {
        conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_fresh_database_gets_every_migration() {
        let conn = migrated();
        assert_eq!(recorded(&conn), SCHEMA.len() as u32);
        assert!(has_column(&conn, "lessons", "status_text").unwrap());
    }

    #[test]
    fn test_rerun_applies_nothing() {
        let mut conn = migrated();
        run_all(&mut conn).unwrap();
        assert_eq!(recorded(&conn), SCHEMA.len() as u32);
    }

    #[test]
    fn test_hand_added_column_is_tolerated() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("sql/002_create_lessons.sql"))
            .unwrap();
        conn.execute_batch("ALTER TABLE lessons ADD COLUMN status_text TEXT;")
            .unwrap();

        run_all(&mut conn).unwrap();
        assert_eq!(recorded(&conn), SCHEMA.len() as u32);
    }

    #[test]
    fn test_failed_step_is_not_recorded() {
        let mut conn = Connection::open_in_memory().unwrap();
        // A view named like the table makes the CREATE TABLE step fail.
        conn.execute_batch("CREATE VIEW lessons AS SELECT 1 AS x;")
            .unwrap();

        let err = run_all(&mut conn).unwrap_err();
        assert!(matches!(err, DatabaseError::Migration { version: 2, .. }));
        let versions = applied_versions(&conn).unwrap();
        assert!(versions.contains(&1));
        assert!(!versions.contains(&2));
    }

    #[test]
    fn test_lease_and_cycle_tables_accept_rows() {
        let conn = migrated();
        conn.execute(
            "INSERT INTO batch_lease (name, holder, acquired_at, expires_at)
             VALUES ('batch', 'h1', '2026-01-01T00:00:00Z', '2026-01-01T00:15:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO batch_cycles (started_at, studio_count) VALUES ('2026-01-01T00:00:00Z', 3)",
            [],
        )
        .unwrap();
    }
}
