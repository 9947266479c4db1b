//! Turning a validated [`Config`] into runtime settings.

use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;

use super::schema::Config;
use crate::batch::BatchSettings;
use crate::browser::LaunchProfile;
use crate::db::default_database_path;
use crate::error::ConfigError;
use crate::extract::{PatternSet, ProgramCatalog, ScheduleExtractor};
use crate::recovery::RecoveryCoordinator;
use crate::scrape::{
    unit_budget, BackoffSchedule, LoginSettings, ReadinessWaiter, ScrapeSettings, StepTimeouts,
};
use crate::secrets::resolve_secret;

impl Config {
    pub fn launch_profile(&self) -> LaunchProfile {
        LaunchProfile::new(
            self.browser.environment,
            self.browser.executable.clone(),
            self.browser.headless,
            &self.browser.args,
        )
    }

    pub fn pattern_set(&self) -> PatternSet {
        PatternSet::with_overrides(&self.patterns)
    }

    pub fn schedule_extractor(&self) -> ScheduleExtractor {
        ScheduleExtractor::new(
            self.pattern_set(),
            ProgramCatalog::new(self.programs.prefixes.clone(), self.programs.catch_all.clone()),
            self.lessons.sold_out_markers.clone(),
        )
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.site.utc_offset_hours * 3600).ok_or_else(|| {
            ConfigError::Validation {
                message: format!("Invalid UTC offset: {}h", self.site.utc_offset_hours),
            }
        })
    }

    /// Session settings, resolving the login password from its source.
    pub fn scrape_settings(&self) -> Result<ScrapeSettings, ConfigError> {
        let login = match &self.site.login {
            Some(login) => Some(LoginSettings {
                url: login.url.clone(),
                email: login.email.clone(),
                password: resolve_secret(
                    login.password.as_deref(),
                    login.password_file.as_deref(),
                    login.password_env_var.as_deref(),
                )?,
            }),
            None => None,
        };

        Ok(ScrapeSettings {
            entry_url: self.site.entry_url.clone(),
            login,
            utc_offset: self.utc_offset()?,
            retention: days("lessons.retention_days", self.lessons.retention_days)?,
            timeouts: self.step_timeouts(),
            waiter: self.readiness_waiter(),
        })
    }

    pub fn step_timeouts(&self) -> StepTimeouts {
        let t = &self.timeouts;
        StepTimeouts {
            launch: Duration::from_secs(t.launch_secs),
            navigate: Duration::from_secs(t.navigate_secs),
            login: Duration::from_secs(t.login_secs),
            ready: Duration::from_secs(t.ready_secs),
            select: Duration::from_secs(t.select_secs),
            extract: Duration::from_secs(t.extract_secs),
            close: Duration::from_secs(t.close_secs),
            settle: Duration::from_millis(t.settle_ms),
        }
    }

    pub fn readiness_waiter(&self) -> ReadinessWaiter {
        let t = &self.timeouts;
        ReadinessWaiter {
            poll_interval: Duration::from_millis(t.poll_interval_ms),
            fallback_attempts: t.fallback_attempts,
            fallback_interval: Duration::from_millis(t.fallback_interval_ms),
        }
    }

    /// Worst case for one studio: every attempt runs out every step, with
    /// the full backoff in between.
    pub fn unit_budget(&self) -> Duration {
        let attempt = self
            .step_timeouts()
            .attempt_budget(&self.readiness_waiter(), self.site.login.is_some());
        unit_budget(attempt, &self.backoff(), self.retry.max_attempts)
    }

    pub fn backoff(&self) -> BackoffSchedule {
        BackoffSchedule::from_secs(&self.retry.backoff_secs)
    }

    pub fn recovery(&self) -> RecoveryCoordinator {
        RecoveryCoordinator::new(self.registry.abort_failure_ratio)
    }

    pub fn batch_settings(&self) -> Result<BatchSettings, ConfigError> {
        let r = &self.registry;
        Ok(BatchSettings {
            lease_ttl: minutes("registry.lease_ttl_minutes", r.lease_ttl_minutes)?,
            stale_after: minutes("registry.stale_after_minutes", r.stale_after_minutes)?,
            min_cycle_interval: minutes(
                "registry.min_cycle_interval_minutes",
                r.min_cycle_interval_minutes,
            )?,
            ..BatchSettings::default()
        })
    }

    /// Configured database path, else the per-user default.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path.clone().or_else(default_database_path)
    }
}

fn out_of_range(field: &str, value: i64) -> ConfigError {
    ConfigError::Validation {
        message: format!("{} is out of range: {}", field, value),
    }
}

fn days(field: &str, value: i64) -> Result<chrono::Duration, ConfigError> {
    chrono::Duration::try_days(value).ok_or_else(|| out_of_range(field, value))
}

fn minutes(field: &str, value: i64) -> Result<chrono::Duration, ConfigError> {
    chrono::Duration::try_minutes(value).ok_or_else(|| out_of_range(field, value))
}
