//! Recovery policy.
//!
//! Classifies a failure and picks what the batch should do about it. It
//! never re-runs the failed operation itself.

use std::fmt;

use serde::Serialize;

/// Failure category, derived from the concrete error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ContentNotReady,
    EmptySchedule,
    Structural,
    Navigation,
    StudioNotFound,
    Environment,
    Store,
    Source,
    Unknown,
}

impl ErrorKind {
    /// Failures a later attempt may not hit again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ContentNotReady | Self::EmptySchedule | Self::Navigation
        )
    }
}

/// The operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    RefreshStudios,
    ScrapeStudio,
    PersistLessons,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RefreshStudios => "refresh_studios",
            Self::ScrapeStudio => "scrape_studio",
            Self::PersistLessons => "persist_lessons",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemState {
    pub total_studios: u64,
    pub failed_studios: u64,
}

impl SystemState {
    pub fn failure_ratio(&self) -> f64 {
        if self.total_studios == 0 {
            return 0.0;
        }
        self.failed_studios as f64 / self.total_studios as f64
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryContext {
    pub kind: ErrorKind,
    pub message: String,
    pub operation: Operation,
    /// Retry count before this failure is recorded.
    pub retry_count: u32,
    pub max_retries: u32,
    pub state: SystemState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Leave the unit failed so a later invocation picks it up.
    RetryLater,
    /// Nothing to do for this unit in this cycle.
    Skip,
    /// Continue with degraded data.
    Fallback,
    /// Stop the current cycle.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResult {
    pub success: bool,
    pub action: RecoveryAction,
    pub detail: String,
    pub fallback_used: bool,
}

impl RecoveryResult {
    fn recovered(action: RecoveryAction, detail: String) -> Self {
        Self {
            success: true,
            action,
            detail,
            fallback_used: false,
        }
    }

    fn fallback(action: RecoveryAction, detail: String) -> Self {
        Self {
            success: true,
            action,
            detail,
            fallback_used: true,
        }
    }

    fn unrecoverable(detail: String) -> Self {
        Self {
            success: false,
            action: RecoveryAction::Abort,
            detail,
            fallback_used: false,
        }
    }
}

pub const DEFAULT_ABORT_FAILURE_RATIO: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct RecoveryCoordinator {
    abort_failure_ratio: f64,
}

impl Default for RecoveryCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_ABORT_FAILURE_RATIO)
    }
}

impl RecoveryCoordinator {
    pub fn new(abort_failure_ratio: f64) -> Self {
        Self {
            abort_failure_ratio,
        }
    }

    pub fn attempt_recovery(&self, ctx: &RecoveryContext) -> RecoveryResult {
        let result = match ctx.operation {
            Operation::RefreshStudios => self.refresh_failed(ctx),
            Operation::ScrapeStudio => scrape_failed(ctx),
            Operation::PersistLessons => persist_failed(ctx),
        };
        tracing::info!(
            operation = %ctx.operation,
            kind = ?ctx.kind,
            action = ?result.action,
            success = result.success,
            fallback = result.fallback_used,
            "recovery decided"
        );
        result
    }

    fn refresh_failed(&self, ctx: &RecoveryContext) -> RecoveryResult {
        let ratio = ctx.state.failure_ratio();
        if ratio > self.abort_failure_ratio {
            return RecoveryResult::unrecoverable(format!(
                "studio refresh failed and {:.0}% of studios are failing: {}",
                ratio * 100.0,
                ctx.message
            ));
        }
        if ctx.state.total_studios > 0 {
            return RecoveryResult::fallback(
                RecoveryAction::Fallback,
                format!(
                    "studio refresh failed, keeping {} known studios: {}",
                    ctx.state.total_studios, ctx.message
                ),
            );
        }
        RecoveryResult::unrecoverable(format!(
            "studio refresh failed with no known studios: {}",
            ctx.message
        ))
    }
}

fn budget_left(ctx: &RecoveryContext) -> bool {
    ctx.retry_count.saturating_add(1) < ctx.max_retries
}

fn scrape_failed(ctx: &RecoveryContext) -> RecoveryResult {
    match ctx.kind {
        ErrorKind::StudioNotFound => RecoveryResult::recovered(
            RecoveryAction::Skip,
            format!("studio not offered on the site today: {}", ctx.message),
        ),
        ErrorKind::Environment => RecoveryResult::unrecoverable(format!(
            "browser environment unavailable: {}",
            ctx.message
        )),
        _ if budget_left(ctx) => RecoveryResult::fallback(
            RecoveryAction::RetryLater,
            format!(
                "{:?} failure, retry {} of {} later: {}",
                ctx.kind,
                ctx.retry_count + 1,
                ctx.max_retries,
                ctx.message
            ),
        ),
        _ => RecoveryResult::unrecoverable(format!(
            "retry budget exhausted after {} failures: {}",
            ctx.max_retries, ctx.message
        )),
    }
}

fn persist_failed(ctx: &RecoveryContext) -> RecoveryResult {
    if budget_left(ctx) {
        RecoveryResult::fallback(
            RecoveryAction::RetryLater,
            format!("lesson store write failed, retrying later: {}", ctx.message),
        )
    } else {
        RecoveryResult::unrecoverable(format!(
            "lesson store write failed, retry budget exhausted: {}",
            ctx.message
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(kind: ErrorKind, operation: Operation, retry_count: u32) -> RecoveryContext {
        RecoveryContext {
            kind,
            message: "boom".to_string(),
            operation,
            retry_count,
            max_retries: 3,
            state: SystemState {
                total_studios: 10,
                failed_studios: 1,
            },
        }
    }

    #[test]
    fn test_refresh_keeps_known_studios() {
        let r = RecoveryCoordinator::default()
            .attempt_recovery(&ctx(ErrorKind::Source, Operation::RefreshStudios, 0));
        assert!(r.success);
        assert!(r.fallback_used);
        assert_eq!(r.action, RecoveryAction::Fallback);
    }

    #[test]
    fn test_refresh_aborts_on_high_failure_ratio() {
        let mut c = ctx(ErrorKind::Source, Operation::RefreshStudios, 0);
        c.state.failed_studios = 6;
        let r = RecoveryCoordinator::default().attempt_recovery(&c);
        assert!(!r.success);
        assert_eq!(r.action, RecoveryAction::Abort);
    }

    #[test]
    fn test_refresh_without_known_studios_is_unrecoverable() {
        let mut c = ctx(ErrorKind::Source, Operation::RefreshStudios, 0);
        c.state = SystemState::default();
        assert!(!RecoveryCoordinator::default().attempt_recovery(&c).success);
    }

    #[test]
    fn test_studio_not_found_is_skipped_without_fallback() {
        let r = RecoveryCoordinator::default()
            .attempt_recovery(&ctx(ErrorKind::StudioNotFound, Operation::ScrapeStudio, 0));
        assert!(r.success);
        assert!(!r.fallback_used);
        assert_eq!(r.action, RecoveryAction::Skip);
    }

    #[test]
    fn test_environment_is_unrecoverable() {
        let r = RecoveryCoordinator::default()
            .attempt_recovery(&ctx(ErrorKind::Environment, Operation::ScrapeStudio, 0));
        assert!(!r.success);
    }

    #[test]
    fn test_transient_retries_later_until_budget_spent() {
        let coordinator = RecoveryCoordinator::default();
        for retry_count in 0..2 {
            let r = coordinator.attempt_recovery(&ctx(ErrorKind::Timeout, Operation::ScrapeStudio, retry_count));
            assert!(r.success && r.fallback_used, "retry_count {}", retry_count);
            assert_eq!(r.action, RecoveryAction::RetryLater);
        }
        let r = coordinator.attempt_recovery(&ctx(ErrorKind::Timeout, Operation::ScrapeStudio, 2));
        assert!(!r.success);
    }

    #[test]
    fn test_persist_failure() {
        let coordinator = RecoveryCoordinator::default();
        let r = coordinator.attempt_recovery(&ctx(ErrorKind::Store, Operation::PersistLessons, 0));
        assert_eq!(r.action, RecoveryAction::RetryLater);
        let r = coordinator.attempt_recovery(&ctx(ErrorKind::Store, Operation::PersistLessons, 5));
        assert!(!r.success);
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ErrorKind::Timeout.is_transient());
        assert!(!ErrorKind::Structural.is_transient());
        assert!(!ErrorKind::Environment.is_transient());
    }
}
