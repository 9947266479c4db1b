use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{lesson_repo, Database};

use super::{LessonRecord, LessonStore, StoreError};

/// [`LessonStore`] backed by the `lessons` table.
#[derive(Clone)]
pub struct SqliteLessonStore {
    db: Database,
}

impl SqliteLessonStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Lessons currently stored for one studio, ordered by start.
    pub fn lessons_for(&self, studio_code: &str) -> Result<Vec<LessonRecord>, StoreError> {
        Ok(lesson_repo::list_by_studio(&self.db, studio_code)?)
    }
}

#[async_trait]
impl LessonStore for SqliteLessonStore {
    async fn put_many(&self, lessons: &[LessonRecord]) -> Result<usize, StoreError> {
        let written = lesson_repo::upsert_many(&self.db, lessons)?;
        log::debug!("Upserted {} lessons", written);
        Ok(written)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(lesson_repo::delete_expired(&self.db, &now)?)
    }
}
