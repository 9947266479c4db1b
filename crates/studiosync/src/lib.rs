pub mod app;
pub mod batch;
pub mod browser;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod logging;
pub mod recovery;
pub mod registry;
pub mod scrape;
pub mod secrets;
pub mod source;
pub mod store;

pub use app::build_coordinator;
pub use batch::{BatchAction, BatchCoordinator, BatchError, BatchOutcome, BatchProgress};
pub use config::{load_config, Config};
pub use error::{ConfigError, Result, StudioSyncError};
pub use extract::{Extraction, ExtractionDiagnostics, PatternSet, Role, ScheduleExtractor};
pub use recovery::{RecoveryAction, RecoveryCoordinator, RecoveryResult};
pub use registry::{BatchStatus, StudioInfo, StudioRef, StudioRegistry, StudioWorkRecord};
pub use scrape::{RetryController, ScrapeError, ScrapeReport};
pub use secrets::{resolve_secret, SecretError, SecretSource};
pub use store::{LessonRecord, LessonStore, SqliteLessonStore, StoreError};
