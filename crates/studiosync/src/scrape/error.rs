use thiserror::Error;

use super::retry::AttemptRecord;
use crate::browser::BrowserError;
use crate::extract::StructuralError;
use crate::recovery::ErrorKind;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Step '{step}' timed out after {secs}s")]
    Timeout { step: &'static str, secs: u64 },

    #[error("Content not ready: '{condition}' unmet after {attempts} fallback attempts")]
    ContentNotReady { condition: String, attempts: u32 },

    #[error("No lessons extracted for studio {studio}")]
    EmptySchedule { studio: String },

    #[error("Schedule structure not found for studio {studio}: {error}")]
    Structural {
        studio: String,
        error: StructuralError,
    },

    #[error("Studio {studio} is not offered on the entry page ({listed} listed)")]
    StudioNotFound { studio: String, listed: usize },

    #[error("Login failed: {0}")]
    Login(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Studio {studio} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        studio: String,
        attempts: u32,
        last: Box<ScrapeError>,
        history: Vec<AttemptRecord>,
    },
}

impl ScrapeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ContentNotReady { .. } => ErrorKind::ContentNotReady,
            Self::EmptySchedule { .. } => ErrorKind::EmptySchedule,
            Self::Structural { .. } => ErrorKind::Structural,
            Self::StudioNotFound { .. } => ErrorKind::StudioNotFound,
            Self::Login(_) => ErrorKind::Navigation,
            Self::Browser(BrowserError::Launch(_)) => ErrorKind::Environment,
            Self::Browser(_) => ErrorKind::Navigation,
            Self::RetriesExhausted { last, .. } => last.kind(),
        }
    }

    /// Whether a later attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Whether the retry loop should try again after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::StudioNotFound { .. } | Self::RetriesExhausted { .. }
        )
    }
}
