//! Error types for habitsync-core

use thiserror::Error;

use crate::sync::GatewayError;

/// Result type alias using habitsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in habitsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity or queue item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store handle was closed; nothing may be written through it anymore
    #[error("Store is closed")]
    StoreClosed,

    /// Remote API failure
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
