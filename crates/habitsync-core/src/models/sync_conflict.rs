//! Sync conflict model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{LocalId, ResourceKind};
use crate::error::Error;

/// Which side's state was kept when local and remote both changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Local,
    Remote,
}

impl Resolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(Error::InvalidInput(format!("Unknown resolution: {other}"))),
        }
    }
}

/// Recorded sync conflict resolved by last-write-wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    pub resource_type: ResourceKind,
    pub local_id: LocalId,
    /// Local entity's timestamp when the conflict occurred
    pub local_updated_at: i64,
    /// Incoming remote timestamp
    pub remote_updated_at: i64,
    pub winner: Resolution,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
}
