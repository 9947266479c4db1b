//! Lesson records and the store they are published to.

mod sqlite;

pub use sqlite::SqliteLessonStore;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::db::DatabaseError;

/// Display colours the site assigns to a lesson tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonColors {
    pub text: Option<String>,
    pub background: Option<String>,
}

/// One scheduled lesson at one studio.
///
/// Keyed by `(studio_code, start_at)`. Only built from entries whose time
/// range, name and instructor were all resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRecord {
    pub studio_code: String,
    pub date: NaiveDate,
    /// `HH:MM`
    pub start_time: String,
    /// `HH:MM`
    pub end_time: String,
    /// Start instant in the site's UTC offset.
    pub start_at: DateTime<FixedOffset>,
    pub name: String,
    pub instructor: String,
    pub program: String,
    pub is_available: bool,
    pub seats_left: Option<u32>,
    pub status_text: Option<String>,
    pub colors: Option<LessonColors>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Lesson store database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Lesson store backend error: {0}")]
    Backend(String),
}

/// Destination for extracted lessons.
///
/// `put_many` is an idempotent upsert on `(studio_code, start_at)`.
#[async_trait]
pub trait LessonStore: Send + Sync {
    async fn put_many(&self, lessons: &[LessonRecord]) -> Result<usize, StoreError>;

    /// Deletes records whose `expires_at` is at or before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}
