use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of a requested item (file). Always positive.
pub type ItemId = i64;

/// Opaque job identifier, a UUID v4 generated at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random job id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job id supplied by a caller.
    ///
    /// A malformed value is a validation error, never a not-found error.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| CoreError::Validation(format!("Malformed job id: '{raw}'")))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
