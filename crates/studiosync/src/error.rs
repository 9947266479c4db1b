use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StudioSyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Batch error: {0}")]
    Batch(#[from] crate::batch::BatchError),

    #[error("Scrape error: {0}")]
    Scrape(#[from] crate::scrape::ScrapeError),

    #[error("Studio source error: {0}")]
    Source(#[from] crate::source::SourceError),

    #[error("Lesson store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("No browser driver available: {0}")]
    NoBrowser(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid {role} pattern '{pattern}': {reason}")]
    InvalidPattern {
        role: String,
        pattern: String,
        reason: String,
    },

    #[error("Site login secret: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

pub type Result<T> = std::result::Result<T, StudioSyncError>;
