//! Last-write-wins conflict resolution.

use super::gateway::RemoteRecord;
use crate::models::{Resolution, SyncableEntity};

/// Decide whose state survives when a pulled record meets a local entity.
///
/// A synced local entity has nothing to protect, so the remote side wins.
/// Otherwise the later `updated_at` wins and a tie goes to the remote side.
pub fn resolve(local: &SyncableEntity, remote: &RemoteRecord) -> Resolution {
    if !local.has_local_edits() {
        return Resolution::Remote;
    }

    if local.updated_at > remote.updated_at {
        Resolution::Local
    } else {
        Resolution::Remote
    }
}
