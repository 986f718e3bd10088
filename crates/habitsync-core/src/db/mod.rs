//! Database layer for habitsync

mod connection;
mod entity_repository;
mod migrations;
mod queue_repository;
mod sync_state_repository;

pub use connection::Database;
pub use entity_repository::{EntityRepository, LibSqlEntityRepository, StoreWrite};
pub use queue_repository::{AttemptFailure, LibSqlQueueRepository, QueueRepository};
pub(crate) use sync_state_repository::{LAST_SYNC_KEY, WATERMARK_KEY};
pub use sync_state_repository::{LibSqlSyncStateRepository, SyncStateRepository};
