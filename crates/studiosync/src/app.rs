//! Wiring the components together from a loaded configuration.

use std::sync::Arc;

use crate::batch::BatchCoordinator;
use crate::browser::BrowserLauncher;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::registry::StudioRegistry;
use crate::scrape::{RetryController, SessionFactory};
use crate::source::BrowserStudioSource;
use crate::store::SqliteLessonStore;

/// Builds a coordinator whose sessions, studio source and stores all run
/// against `db` and `launcher`.
pub fn build_coordinator(
    config: &Config,
    db: Database,
    launcher: Arc<dyn BrowserLauncher>,
) -> Result<BatchCoordinator> {
    let profile = config.launch_profile();
    let settings = Arc::new(config.scrape_settings()?);
    let sessions = SessionFactory::new(
        Arc::clone(&launcher),
        profile.clone(),
        Arc::clone(&settings),
        config.schedule_extractor(),
    );
    let source = BrowserStudioSource::new(launcher, profile, settings, config.pattern_set());
    let scraper = RetryController::new(sessions, config.backoff(), config.retry.max_attempts);

    Ok(BatchCoordinator::new(
        StudioRegistry::new(db.clone(), config.registry.max_retries),
        Arc::new(scraper),
        Arc::new(SqliteLessonStore::new(db)),
        Arc::new(source),
        config.recovery(),
        config.batch_settings()?,
    ))
}
