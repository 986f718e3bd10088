//! habitsync-core - Core library for habitsync
//!
//! This crate contains the models, the local store and its durable operation
//! queue, and the sync engine shared by the habitsync interfaces.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::{RemoteConfig, SyncEngineConfig};
pub use error::{Error, Result};
pub use models::{LocalId, QueuedOperation, ResourceKind, SyncableEntity};
pub use services::{HabitPatch, SyncStore};
pub use state::{EngineStatus, SyncPhase, SyncState};
pub use sync::{HttpGateway, NetworkMonitor, SyncEngine, SyncOutcome};
