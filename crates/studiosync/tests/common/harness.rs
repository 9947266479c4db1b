//! Test harness owning a temporary database.

#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;

use studiosync::db::Database;
use studiosync::registry::{StudioRegistry, DEFAULT_MAX_RETRIES};
use studiosync::store::SqliteLessonStore;

/// A file-backed database in a temporary directory, removed on drop.
pub struct TestHarness {
    _temp_dir: TempDir,
    pub db_path: PathBuf,
    pub db: Database,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("studiosync.db");
        let db = Database::open(&db_path).expect("Failed to open test database");
        Self {
            _temp_dir: temp_dir,
            db_path,
            db,
        }
    }

    pub fn registry(&self) -> StudioRegistry {
        self.registry_with_retries(DEFAULT_MAX_RETRIES)
    }

    pub fn registry_with_retries(&self, max_retries: u32) -> StudioRegistry {
        StudioRegistry::new(self.db.clone(), max_retries)
    }

    pub fn store(&self) -> SqliteLessonStore {
        SqliteLessonStore::new(self.db.clone())
    }

    /// A second connection to the same file, as another process would open it.
    pub fn reopen(&self) -> Database {
        Database::open(&self.db_path).expect("Failed to reopen test database")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
