use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::extract::PatternSet;
use crate::secrets::SecretSource;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    url::Url::parse(&config.site.entry_url).map_err(|e| ConfigError::Validation {
        message: format!("Invalid site.entry_url '{}': {}", config.site.entry_url, e),
    })?;

    if !(-12..=14).contains(&config.site.utc_offset_hours) {
        return Err(ConfigError::Validation {
            message: format!(
                "site.utc_offset_hours must be between -12 and 14, got {}",
                config.site.utc_offset_hours
            ),
        });
    }

    if let Some(login) = &config.site.login {
        url::Url::parse(&login.url).map_err(|e| ConfigError::Validation {
            message: format!("Invalid site.login.url '{}': {}", login.url, e),
        })?;
        let source = SecretSource::first_of(
            login.password.as_deref(),
            login.password_file.as_deref(),
            login.password_env_var.as_deref(),
        );
        if source.is_none() {
            return Err(ConfigError::Validation {
                message: "site.login needs password, password_file or password_env_var"
                    .to_string(),
            });
        }
    }

    if config.retry.max_attempts < 1 {
        return Err(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }
    if config.retry.backoff_secs.is_empty() {
        return Err(ConfigError::Validation {
            message: "retry.backoff_secs must not be empty".to_string(),
        });
    }
    if !config.backoff().is_non_decreasing() {
        return Err(ConfigError::Validation {
            message: format!(
                "retry.backoff_secs must never decrease, got {:?}",
                config.retry.backoff_secs
            ),
        });
    }

    // The lease must outlive the slowest studio, or a second invocation
    // could take over while this one is still writing.
    let needed_minutes = config.unit_budget().as_secs().div_ceil(60);
    if (config.registry.lease_ttl_minutes as u64) < needed_minutes {
        return Err(ConfigError::Validation {
            message: format!(
                "registry.lease_ttl_minutes is {} but one studio can take up to {} minutes with these timeouts and retries",
                config.registry.lease_ttl_minutes, needed_minutes
            ),
        });
    }

    if config.programs.prefixes.is_empty() {
        return Err(ConfigError::Validation {
            message: "programs.prefixes must not be empty".to_string(),
        });
    }

    if !(0.0..=1.0).contains(&config.registry.abort_failure_ratio) {
        return Err(ConfigError::Validation {
            message: "registry.abort_failure_ratio must be between 0 and 1".to_string(),
        });
    }

    if let Some((role, pattern, reason)) = PatternSet::with_overrides(&config.patterns).first_invalid() {
        return Err(ConfigError::InvalidPattern {
            role: role.to_string(),
            pattern,
            reason,
        });
    }

    Ok(())
}
