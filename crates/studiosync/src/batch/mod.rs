//! One-unit-per-invocation batch driver.

mod coordinator;
mod progress;

pub use coordinator::{
    BatchAction, BatchCoordinator, BatchError, BatchOutcome, BatchSettings, RefreshResult,
};
pub use progress::BatchProgress;
