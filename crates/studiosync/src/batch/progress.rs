use serde::Serialize;

use crate::registry::RegistryCounts;

/// Cycle progress as reported to the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub processing: u64,
    pub remaining: u64,
    /// Failed studios with no retries left this cycle.
    pub exhausted: u64,
    pub percent_done: f64,
}

impl From<RegistryCounts> for BatchProgress {
    fn from(c: RegistryCounts) -> Self {
        let done = c.completed + c.exhausted;
        let percent_done = if c.total == 0 {
            0.0
        } else {
            (done as f64 / c.total as f64 * 1000.0).round() / 10.0
        };
        Self {
            total: c.total,
            completed: c.completed,
            failed: c.failed,
            processing: c.processing,
            remaining: c.remaining,
            exhausted: c.exhausted,
            percent_done,
        }
    }
}
