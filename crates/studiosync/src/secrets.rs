//! Login password lookup.
//!
//! The config may give the password inline, point at a file holding it
//! (mounted container secrets), or name an environment variable. When more
//! than one is set the earlier one in that list wins.

use std::env::{self, VarError};
use std::path::PathBuf;

use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No password source configured (password, password_file or password_env_var)")]
    Missing,

    #[error("Cannot read password file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Password variable ${name} is not set")]
    EnvUnset { name: String },

    #[error("Password variable ${name} is not valid UTF-8")]
    EnvNotUnicode { name: String },
}

/// Where a password is read from. Empty strings count as unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource<'a> {
    Inline(&'a str),
    File(&'a str),
    Env(&'a str),
}

impl<'a> SecretSource<'a> {
    pub fn first_of(
        inline: Option<&'a str>,
        file: Option<&'a str>,
        env_var: Option<&'a str>,
    ) -> Option<Self> {
        let non_empty = |s: Option<&'a str>| s.filter(|s| !s.trim().is_empty());
        non_empty(inline)
            .map(Self::Inline)
            .or_else(|| non_empty(file).map(Self::File))
            .or_else(|| non_empty(env_var).map(Self::Env))
    }

    /// Reads the password. File and environment values lose surrounding
    /// whitespace; inline values are taken as written.
    pub fn read(self) -> Result<SecretString, SecretError> {
        let value = match self {
            Self::Inline(value) => value.to_owned(),
            Self::File(raw) => {
                let path = home_relative(raw);
                std::fs::read_to_string(&path)
                    .map_err(|source| SecretError::File { path, source })?
                    .trim()
                    .to_owned()
            }
            Self::Env(name) => match env::var(name) {
                Ok(value) => value.trim().to_owned(),
                Err(VarError::NotPresent) => {
                    return Err(SecretError::EnvUnset { name: name.into() })
                }
                Err(VarError::NotUnicode(_)) => {
                    return Err(SecretError::EnvNotUnicode { name: name.into() })
                }
            },
        };
        Ok(SecretString::from(value))
    }
}

pub fn resolve_secret(
    inline: Option<&str>,
    file: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString, SecretError> {
    SecretSource::first_of(inline, file, env_var)
        .ok_or(SecretError::Missing)?
        .read()
}

fn home_relative(raw: &str) -> PathBuf {
    match (raw.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if raw == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw)),
        _ => PathBuf::from(raw),
    }
}
