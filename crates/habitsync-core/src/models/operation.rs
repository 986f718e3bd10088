//! Queued operation model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{LocalId, ResourceKind, SyncableEntity};
use crate::error::{Error, Result};

/// Kind of remote mutation a queue item stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("Unknown operation type: {other}"))),
        }
    }
}

/// A pending mutation not yet confirmed by the remote system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Queue-local id; strictly increasing, defines FIFO order
    pub id: i64,
    pub operation_type: OperationType,
    pub resource_type: ResourceKind,
    pub resource_local_id: LocalId,
    /// Fields captured when the operation was enqueued
    pub payload: serde_json::Value,
    pub retry_count: u32,
    pub last_attempt_at: Option<i64>,
    /// Backoff: the item is not attempted again before this time (Unix ms)
    pub next_attempt_at: Option<i64>,
    pub error: Option<String>,
    /// Terminally failed; kept for visibility, never retried automatically
    pub failed: bool,
    pub created_at: i64,
}

impl QueuedOperation {
    /// Whether the item may be attempted at `now`.
    pub fn is_due(&self, now: i64) -> bool {
        !self.failed && self.next_attempt_at.is_none_or(|at| at <= now)
    }
}

/// An operation about to be appended to the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperation {
    pub operation_type: OperationType,
    pub resource_type: ResourceKind,
    pub resource_local_id: LocalId,
    pub payload: serde_json::Value,
}

impl NewOperation {
    /// Snapshot the entity's current fields for pushing.
    ///
    /// Deletes carry no payload; the server id is read from the tombstone
    /// when the item is sent.
    pub fn for_entity(operation_type: OperationType, entity: &SyncableEntity) -> Result<Self> {
        let payload = match operation_type {
            OperationType::Create | OperationType::Update => entity.data.to_fields()?,
            OperationType::Delete => serde_json::Value::Null,
        };
        Ok(Self {
            operation_type,
            resource_type: entity.kind(),
            resource_local_id: entity.local_id,
            payload,
        })
    }
}
