//! Browser-driven schedule scraping.

mod error;
pub mod readiness;
pub mod retry;
pub mod session;

pub use error::ScrapeError;
pub use readiness::{ReadinessWaiter, ReadyCondition, ReadyVia};
pub use retry::{
    unit_budget, AttemptRecord, BackoffSchedule, RetryController, ScrapeReport,
    DEFAULT_MAX_ATTEMPTS,
};
pub use session::{
    LoginSettings, ScrapeSession, ScrapeSettings, SessionFactory, SessionOutput, StepTimeouts,
};

use async_trait::async_trait;

use crate::registry::StudioRef;

/// Produces a studio's lessons, retrying internally as it sees fit.
#[async_trait]
pub trait StudioScraper: Send + Sync {
    async fn scrape(&self, studio: &StudioRef) -> Result<ScrapeReport, ScrapeError>;
}
