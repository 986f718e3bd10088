//! Shared sync state types reported to clients.

use std::fmt;

use serde::Serialize;

/// Step of a sync pass, published on the engine's phase channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Idle,
    /// Pushing queued operations
    Draining,
    /// Fetching remote changes
    Pulling,
    /// Merging remote changes into the store
    Reconciling,
}

impl SyncPhase {
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// One-word summary for status indicators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Offline,
    Syncing,
    Synced,
    Pending,
    Error,
}

impl SyncState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of the engine and its queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub online: bool,
    pub syncing: bool,
    pub phase: SyncPhase,
    /// Operations still eligible for pushing
    pub pending_operations: usize,
    /// Terminally failed operations awaiting manual retry or discard
    pub failed_operations: usize,
    /// When the last pass completed (Unix ms)
    pub last_sync_at: Option<i64>,
    /// Last pass error followed by the errors of failed operations
    pub errors: Vec<String>,
}

impl EngineStatus {
    pub fn state(&self) -> SyncState {
        if self.syncing {
            SyncState::Syncing
        } else if !self.online {
            SyncState::Offline
        } else if self.failed_operations > 0 || !self.errors.is_empty() {
            SyncState::Error
        } else if self.pending_operations > 0 {
            SyncState::Pending
        } else {
            SyncState::Synced
        }
    }
}
