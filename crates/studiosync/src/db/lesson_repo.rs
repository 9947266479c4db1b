//! Lesson repository: upserts and reads for the `lessons` table.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Row};

use super::{format_ts, parse_ts, Database, DatabaseError};
use crate::store::{LessonColors, LessonRecord};

/// Upserts lessons keyed by `(studio_code, start_at)` in one transaction.
pub fn upsert_many(db: &Database, lessons: &[LessonRecord]) -> Result<usize, DatabaseError> {
    if lessons.is_empty() {
        return Ok(0);
    }

    db.with_tx(|tx| {
        let mut stmt = tx.prepare(
            "INSERT INTO lessons (studio_code, start_at, date, start_time, end_time, name,
             instructor, program, is_available, seats_left, status_text, text_color,
             background_color, fetched_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(studio_code, start_at) DO UPDATE SET
               date = excluded.date,
               start_time = excluded.start_time,
               end_time = excluded.end_time,
               name = excluded.name,
               instructor = excluded.instructor,
               program = excluded.program,
               is_available = excluded.is_available,
               seats_left = excluded.seats_left,
               status_text = excluded.status_text,
               text_color = excluded.text_color,
               background_color = excluded.background_color,
               fetched_at = excluded.fetched_at,
               expires_at = excluded.expires_at",
        )?;

        let mut written = 0;
        for lesson in lessons {
            let (text_color, background_color) = match &lesson.colors {
                Some(c) => (c.text.as_deref(), c.background.as_deref()),
                None => (None, None),
            };
            written += stmt.execute(params![
                lesson.studio_code,
                lesson.start_at.to_rfc3339(),
                lesson.date.format("%Y-%m-%d").to_string(),
                lesson.start_time,
                lesson.end_time,
                lesson.name,
                lesson.instructor,
                lesson.program,
                lesson.is_available,
                lesson.seats_left,
                lesson.status_text,
                text_color,
                background_color,
                format_ts(&lesson.fetched_at),
                format_ts(&lesson.expires_at),
            ])?;
        }
        Ok(written)
    })
}

/// Deletes lessons whose expiry is at or before `now`.
pub fn delete_expired(db: &Database, now: &DateTime<Utc>) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "DELETE FROM lessons WHERE expires_at <= ?1",
            params![format_ts(now)],
        )?;
        Ok(n)
    })
}

/// Counts all stored lessons.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let n: u64 = conn.query_row("SELECT COUNT(*) FROM lessons", [], |r| r.get(0))?;
        Ok(n)
    })
}

struct LessonRow {
    studio_code: String,
    start_at: String,
    date: String,
    start_time: String,
    end_time: String,
    name: String,
    instructor: String,
    program: String,
    is_available: bool,
    seats_left: Option<u32>,
    status_text: Option<String>,
    text_color: Option<String>,
    background_color: Option<String>,
    fetched_at: String,
    expires_at: String,
}

impl LessonRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            studio_code: row.get("studio_code")?,
            start_at: row.get("start_at")?,
            date: row.get("date")?,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            name: row.get("name")?,
            instructor: row.get("instructor")?,
            program: row.get("program")?,
            is_available: row.get("is_available")?,
            seats_left: row.get("seats_left")?,
            status_text: row.get("status_text")?,
            text_color: row.get("text_color")?,
            background_color: row.get("background_color")?,
            fetched_at: row.get("fetched_at")?,
            expires_at: row.get("expires_at")?,
        })
    }

    fn into_record(self) -> Result<LessonRecord, DatabaseError> {
        let start_at = DateTime::parse_from_rfc3339(&self.start_at).map_err(|_| {
            DatabaseError::InvalidValue {
                column: "start_at",
                value: self.start_at.clone(),
            }
        })?;
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").map_err(|_| {
            DatabaseError::InvalidValue {
                column: "date",
                value: self.date.clone(),
            }
        })?;
        let colors = if self.text_color.is_some() || self.background_color.is_some() {
            Some(LessonColors {
                text: self.text_color,
                background: self.background_color,
            })
        } else {
            None
        };

        Ok(LessonRecord {
            studio_code: self.studio_code,
            date,
            start_time: self.start_time,
            end_time: self.end_time,
            start_at,
            name: self.name,
            instructor: self.instructor,
            program: self.program,
            is_available: self.is_available,
            seats_left: self.seats_left,
            status_text: self.status_text,
            colors,
            fetched_at: parse_ts("fetched_at", &self.fetched_at)?,
            expires_at: parse_ts("expires_at", &self.expires_at)?,
        })
    }
}

/// Lists a studio's lessons ordered by start.
pub fn list_by_studio(db: &Database, studio_code: &str) -> Result<Vec<LessonRecord>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM lessons WHERE studio_code = ?1 ORDER BY start_at")?;
        let rows = stmt
            .query_map(params![studio_code], LessonRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(LessonRow::into_record).collect()
}
