//! Remote gateway interface: the four calls the sync engine makes against the
//! server, plus the records and errors they exchange.

use std::collections::BTreeMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{LocalId, ResourceKind};

/// Failure of a remote call, classified for the retry policy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Network error, timeout, or server-side failure; worth retrying
    #[error("Transient remote failure: {0}")]
    Transient(String),

    /// The server rejected the request; resubmitting it unchanged will not help
    #[error("Remote rejected request{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Permanent { status: Option<u16>, message: String },
}

impl GatewayError {
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            status: None,
            message: message.into(),
        }
    }

    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Payload field carrying the creating client's local id on creates.
///
/// The server can use it to deduplicate a retried create, and a pull uses it
/// to match a record whose create response was lost.
pub const CLIENT_KEY_FIELD: &str = "local_id";

/// Server-side state of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub server_id: String,
    /// Server modification time (Unix ms)
    pub updated_at: i64,
    /// Remote tombstone
    #[serde(default)]
    pub deleted: bool,
    /// Resource fields in the same shape as the local `data` column
    #[serde(default)]
    pub fields: serde_json::Value,
}

impl RemoteRecord {
    /// Local id of the client that created this record, when it sent one.
    pub fn client_key(&self) -> Option<LocalId> {
        self.fields
            .get(CLIENT_KEY_FIELD)
            .and_then(serde_json::Value::as_str)
            .and_then(|value| value.parse().ok())
    }
}

/// Everything that changed on the server since a watermark
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullResponse {
    /// Server time the response is consistent as of; the next watermark
    pub as_of: i64,
    pub resources: BTreeMap<ResourceKind, Vec<RemoteRecord>>,
}

impl PullResponse {
    pub fn record_count(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }
}

/// Remote system the engine pushes to and pulls from.
///
/// Implementations must classify every failure as transient or permanent.
pub trait RemoteGateway: Send + Sync + 'static {
    fn create(
        &self,
        kind: ResourceKind,
        payload: &serde_json::Value,
    ) -> impl Future<Output = GatewayResult<RemoteRecord>> + Send;

    fn update(
        &self,
        kind: ResourceKind,
        server_id: &str,
        payload: &serde_json::Value,
    ) -> impl Future<Output = GatewayResult<RemoteRecord>> + Send;

    fn delete(
        &self,
        kind: ResourceKind,
        server_id: &str,
    ) -> impl Future<Output = GatewayResult<()>> + Send;

    /// Changes newer than `since`; `None` returns everything.
    fn pull_changes(
        &self,
        since: Option<i64>,
    ) -> impl Future<Output = GatewayResult<PullResponse>> + Send;
}
