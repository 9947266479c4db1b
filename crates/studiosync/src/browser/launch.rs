use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the browser runs. Chosen once from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEnvironment {
    /// Constrained container or function runtime: no sandbox, no shared
    /// memory, always headless.
    Sandboxed,
    #[default]
    Local,
}

/// Launch arguments for one browser start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchProfile {
    pub environment: BrowserEnvironment,
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub args: Vec<String>,
}

const SANDBOXED_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-zygote",
    "--single-process",
];

const LOCAL_ARGS: &[&str] = &["--window-size=1280,900"];

impl LaunchProfile {
    pub fn new(
        environment: BrowserEnvironment,
        executable: Option<PathBuf>,
        headless: bool,
        extra_args: &[String],
    ) -> Self {
        let (base, headless) = match environment {
            BrowserEnvironment::Sandboxed => (SANDBOXED_ARGS, true),
            BrowserEnvironment::Local => (LOCAL_ARGS, headless),
        };
        let mut args: Vec<String> = base.iter().map(|s| s.to_string()).collect();
        for arg in extra_args {
            if !args.contains(arg) {
                args.push(arg.clone());
            }
        }
        Self {
            environment,
            executable,
            headless,
            args,
        }
    }
}
