use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] habitsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No habit name provided")]
    EmptyName,
    #[error("ID cannot be empty")]
    EmptyId,
    #[error("{0} not found for id/prefix: {1}")]
    NotFound(&'static str, String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Queue operation #{0} not found")]
    OperationNotFound(i64),
    #[error("Queue operation #{0} has not failed; nothing to retry")]
    NotFailed(i64),
    #[error("Could not resolve a data directory; pass --db-path or set HABITSYNC_DB_PATH")]
    NoDataDir,
    #[error(
        "Sync is not configured. Set HABITSYNC_API_URL (and optionally HABITSYNC_API_TOKEN) to enable `habitsync sync`."
    )]
    SyncNotConfigured,
}
