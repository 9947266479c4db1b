use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::studio_repo::StudioRow;
use crate::db::{parse_ts, DatabaseError};

/// Batch state of one studio within the current cycle. "Unset" is `None`
/// on [`StudioWorkRecord::batch_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown batch status '{}'", other)),
        }
    }
}

/// A studio as listed by the source site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudioInfo {
    pub code: String,
    pub name: String,
    pub region: Option<String>,
}

/// Persisted processing state for one studio.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioWorkRecord {
    pub code: String,
    pub name: String,
    pub region: Option<String>,
    pub batch_status: Option<BatchStatus>,
    pub retry_count: Option<u32>,
    pub last_error: Option<String>,
    pub last_processed: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl StudioWorkRecord {
    /// The identity the scraper needs to select this studio on the site.
    pub fn studio_ref(&self) -> StudioRef {
        StudioRef {
            code: self.code.clone(),
            name: self.name.clone(),
        }
    }
}

impl TryFrom<StudioRow> for StudioWorkRecord {
    type Error = DatabaseError;

    fn try_from(row: StudioRow) -> Result<Self, Self::Error> {
        let batch_status = row
            .batch_status
            .as_deref()
            .map(|s| {
                s.parse::<BatchStatus>()
                    .map_err(|_| DatabaseError::InvalidValue {
                        column: "batch_status",
                        value: s.to_string(),
                    })
            })
            .transpose()?;
        let last_processed = row
            .last_processed
            .as_deref()
            .map(|s| parse_ts("last_processed", s))
            .transpose()?;

        Ok(Self {
            code: row.code,
            name: row.name,
            region: row.region,
            batch_status,
            retry_count: row.retry_count,
            last_error: row.last_error,
            last_processed,
            updated_at: parse_ts("updated_at", &row.updated_at)?,
        })
    }
}

/// Identifies the studio a scrape session should select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioRef {
    pub code: String,
    pub name: String,
}

impl StudioRef {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for StudioRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.name)
    }
}
