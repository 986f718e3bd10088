//! Syncable entity: resource data plus sync metadata

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{LocalId, ResourceData, ResourceKind, SyncableResource};
use crate::error::Error;

/// Push state of an entity relative to the remote system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local edits the remote does not reflect yet
    Pending,
    /// Matches the last server-reported state
    Synced,
    /// The last push failed terminally
    Error,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "error" => Ok(Self::Error),
            other => Err(Error::InvalidInput(format!("Unknown sync status: {other}"))),
        }
    }
}

/// A persisted record of any resource kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncableEntity {
    /// Client-generated primary key
    pub local_id: LocalId,
    /// Id assigned by the server once the create was accepted
    pub server_id: Option<String>,
    pub sync_status: SyncStatus,
    /// Incremented on every local mutation
    pub version: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last local change, or the server timestamp when remote state was adopted (Unix ms)
    pub updated_at: i64,
    /// Last `updated_at` reported by the server (Unix ms)
    pub remote_updated_at: Option<i64>,
    /// Tombstone kept until the remote delete is confirmed
    pub is_deleted: bool,
    /// Last terminal push failure
    pub last_error: Option<String>,
    pub data: ResourceData,
}

impl SyncableEntity {
    /// A brand-new entity created on this device; pending until pushed.
    #[must_use]
    pub fn new_local(data: ResourceData) -> Self {
        let now = crate::util::now_millis();
        Self {
            local_id: LocalId::new(),
            server_id: None,
            sync_status: SyncStatus::Pending,
            version: 1,
            created_at: now,
            updated_at: now,
            remote_updated_at: None,
            is_deleted: false,
            last_error: None,
            data,
        }
    }

    /// An entity first seen in a remote pull (created on another device).
    #[must_use]
    pub fn from_remote(server_id: impl Into<String>, updated_at: i64, data: ResourceData) -> Self {
        Self {
            local_id: LocalId::new(),
            server_id: Some(server_id.into()),
            sync_status: SyncStatus::Synced,
            version: 1,
            created_at: updated_at,
            updated_at,
            remote_updated_at: Some(updated_at),
            is_deleted: false,
            last_error: None,
            data,
        }
    }

    pub const fn kind(&self) -> ResourceKind {
        self.data.kind()
    }

    /// Record a local mutation: bump the version and mark pending.
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = crate::util::now_millis().max(self.updated_at + 1);
        self.sync_status = SyncStatus::Pending;
        self.last_error = None;
    }

    /// Overwrite with the server's version of this resource.
    pub fn adopt_remote(&mut self, server_id: &str, updated_at: i64, data: ResourceData) {
        self.server_id = Some(server_id.to_string());
        self.data = data;
        self.updated_at = updated_at;
        self.remote_updated_at = Some(updated_at);
        self.sync_status = SyncStatus::Synced;
        self.is_deleted = false;
        self.last_error = None;
    }

    pub const fn has_local_edits(&self) -> bool {
        !matches!(self.sync_status, SyncStatus::Synced)
    }

    pub fn resource<T: SyncableResource>(&self) -> Option<&T> {
        T::from_data(&self.data)
    }

    pub fn resource_mut<T: SyncableResource>(&mut self) -> Option<&mut T> {
        T::from_data_mut(&mut self.data)
    }
}
