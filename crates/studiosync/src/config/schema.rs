use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::browser::BrowserEnvironment;
use crate::extract::program::{DEFAULT_CATCH_ALL, DEFAULT_PROGRAMS};
use crate::extract::status::DEFAULT_SOLD_OUT_MARKERS;
use crate::extract::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub site: SiteConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub lessons: LessonsConfig,
    #[serde(default)]
    pub programs: ProgramsConfig,
    /// Per-role pattern lists replacing the built-in ones.
    #[serde(default)]
    pub patterns: BTreeMap<Role, Vec<String>>,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub entry_url: String,
    #[serde(default)]
    pub login: Option<LoginConfig>,
    /// Offset of the site's local time from UTC.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

fn default_utc_offset_hours() -> i32 {
    9
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    pub url: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_file: Option<String>,
    #[serde(default)]
    pub password_env_var: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub environment: BrowserEnvironment,
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            environment: BrowserEnvironment::default(),
            executable: None,
            headless: true,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_launch_secs")]
    pub launch_secs: u64,
    #[serde(default = "default_navigate_secs")]
    pub navigate_secs: u64,
    #[serde(default = "default_navigate_secs")]
    pub login_secs: u64,
    #[serde(default = "default_ready_secs")]
    pub ready_secs: u64,
    #[serde(default = "default_ready_secs")]
    pub select_secs: u64,
    #[serde(default = "default_extract_secs")]
    pub extract_secs: u64,
    #[serde(default = "default_close_secs")]
    pub close_secs: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_fallback_attempts")]
    pub fallback_attempts: u32,
    #[serde(default = "default_fallback_interval_ms")]
    pub fallback_interval_ms: u64,
}

fn default_launch_secs() -> u64 {
    30
}

fn default_navigate_secs() -> u64 {
    30
}

fn default_ready_secs() -> u64 {
    15
}

fn default_extract_secs() -> u64 {
    20
}

fn default_close_secs() -> u64 {
    10
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_fallback_attempts() -> u32 {
    5
}

fn default_fallback_interval_ms() -> u64 {
    2000
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            launch_secs: default_launch_secs(),
            navigate_secs: default_navigate_secs(),
            login_secs: default_navigate_secs(),
            ready_secs: default_ready_secs(),
            select_secs: default_ready_secs(),
            extract_secs: default_extract_secs(),
            close_secs: default_close_secs(),
            settle_ms: default_settle_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            fallback_attempts: default_fallback_attempts(),
            fallback_interval_ms: default_fallback_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: Vec<u64>,
}

fn default_max_attempts() -> u32 {
    crate::scrape::DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_secs() -> Vec<u64> {
    vec![2, 5, 10, 20, 30]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: i64,
    #[serde(default = "default_lease_ttl_minutes")]
    pub lease_ttl_minutes: i64,
    #[serde(default = "default_min_cycle_interval_minutes")]
    pub min_cycle_interval_minutes: i64,
    #[serde(default = "default_abort_failure_ratio")]
    pub abort_failure_ratio: f64,
}

fn default_max_retries() -> u32 {
    crate::registry::DEFAULT_MAX_RETRIES
}

fn default_stale_after_minutes() -> i64 {
    30
}

fn default_lease_ttl_minutes() -> i64 {
    30
}

fn default_min_cycle_interval_minutes() -> i64 {
    12 * 60
}

fn default_abort_failure_ratio() -> f64 {
    crate::recovery::DEFAULT_ABORT_FAILURE_RATIO
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            stale_after_minutes: default_stale_after_minutes(),
            lease_ttl_minutes: default_lease_ttl_minutes(),
            min_cycle_interval_minutes: default_min_cycle_interval_minutes(),
            abort_failure_ratio: default_abort_failure_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonsConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_sold_out_markers")]
    pub sold_out_markers: Vec<String>,
}

fn default_retention_days() -> i64 {
    7
}

fn default_sold_out_markers() -> Vec<String> {
    DEFAULT_SOLD_OUT_MARKERS.iter().map(|s| s.to_string()).collect()
}

impl Default for LessonsConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            sold_out_markers: default_sold_out_markers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramsConfig {
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,
    #[serde(default = "default_catch_all")]
    pub catch_all: String,
}

fn default_prefixes() -> Vec<String> {
    DEFAULT_PROGRAMS.iter().map(|s| s.to_string()).collect()
}

fn default_catch_all() -> String {
    DEFAULT_CATCH_ALL.to_string()
}

impl Default for ProgramsConfig {
    fn default() -> Self {
        Self {
            prefixes: default_prefixes(),
            catch_all: default_catch_all(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
