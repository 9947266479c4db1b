//! Process-wide log setup.
//!
//! `RUST_LOG` wins over the configured level. `log` records from the
//! persistence layer are forwarded into `tracing`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::StudioSyncError;

pub fn filter_for(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), StudioSyncError> {
    let filter = filter_for(config);
    let installed = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        ),
        LogFormat::Text => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };
    installed.map_err(|e| StudioSyncError::Logging(e.to_string()))?;
    tracing_log::LogTracer::init().map_err(|e| StudioSyncError::Logging(e.to_string()))?;
    Ok(())
}
