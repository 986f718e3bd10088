//! Entity store: typed CRUD over every resource table plus the atomic
//! multi-record write used by mutations and the sync engine.

use crate::error::{Error, Result};
use crate::models::{
    LocalId, NewOperation, Resolution, ResourceData, ResourceKind, SyncableEntity,
};
use libsql::{params, Connection, Row};

use super::connection::finish_transaction;
use super::queue_repository::{AttemptFailure, LibSqlQueueRepository, QueueRepository};
use super::sync_state_repository::{LibSqlSyncStateRepository, SyncStateRepository};

const ENTITY_COLUMNS: &str = "local_id, server_id, sync_status, version, created_at, updated_at, \
                              remote_updated_at, is_deleted, last_error, data";

/// One record-level write inside an atomic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    /// Insert or replace an entity (keyed by local id)
    PutEntity(SyncableEntity),
    /// Physically remove an entity row
    RemoveEntity { kind: ResourceKind, local_id: LocalId },
    /// Append an operation to the queue
    Enqueue(NewOperation),
    /// Remove a confirmed operation
    Dequeue(i64),
    /// Remove every queued operation targeting a resource
    CancelOperations { kind: ResourceKind, local_id: LocalId },
    /// Store the outcome of a failed push attempt
    RecordFailure { id: i64, failure: AttemptFailure },
    /// Clear the terminal flag and retry counter of an operation
    ResetOperation(i64),
    /// Set a sync bookkeeping value
    SetState { key: String, value: String },
    /// Append to the conflict log
    LogConflict {
        kind: ResourceKind,
        local_id: LocalId,
        local_updated_at: i64,
        remote_updated_at: i64,
        winner: Resolution,
    },
}

/// Trait for entity storage operations (async)
#[allow(async_fn_in_trait)]
pub trait EntityRepository {
    /// Find an entity by its local id (tombstones included)
    async fn get(&self, kind: ResourceKind, local_id: &LocalId) -> Result<Option<SyncableEntity>>;

    /// Find an entity by the id the server assigned to it
    async fn find_by_server_id(
        &self,
        kind: ResourceKind,
        server_id: &str,
    ) -> Result<Option<SyncableEntity>>;

    /// List entities of a kind, newest first
    async fn list(&self, kind: ResourceKind, include_deleted: bool)
        -> Result<Vec<SyncableEntity>>;

    /// List entities whose `sync_status` is not `synced`
    async fn list_unsynced(&self, kind: ResourceKind) -> Result<Vec<SyncableEntity>>;

    /// Apply all writes in one transaction. Returns the ids of enqueued
    /// operations, in batch order.
    async fn apply_batch(&self, writes: &[StoreWrite]) -> Result<Vec<i64>>;
}

/// libSQL implementation of `EntityRepository`
pub struct LibSqlEntityRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntityRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an entity from a database row
    fn parse_entity(kind: ResourceKind, row: &Row) -> Result<SyncableEntity> {
        let local_id: String = row.get(0)?;
        let sync_status: String = row.get(2)?;
        let data: String = row.get(9)?;

        Ok(SyncableEntity {
            local_id: local_id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid local id in {kind}: {local_id}")))?,
            server_id: row.get(1)?,
            sync_status: sync_status.parse()?,
            version: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            remote_updated_at: row.get(6)?,
            is_deleted: row.get::<i64>(7)? != 0,
            last_error: row.get(8)?,
            data: ResourceData::from_fields(kind, serde_json::from_str(&data)?)?,
        })
    }

    async fn query_entities(
        &self,
        kind: ResourceKind,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<SyncableEntity>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next().await? {
            entities.push(Self::parse_entity(kind, &row)?);
        }
        Ok(entities)
    }

    async fn put_entity(&self, entity: &SyncableEntity) -> Result<()> {
        let table = entity.kind().table();
        let data = serde_json::to_string(&entity.data.to_fields()?)?;

        self.conn
            .execute(
                &format!(
                    "INSERT INTO {table} ({ENTITY_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(local_id) DO UPDATE SET
                        server_id = excluded.server_id,
                        sync_status = excluded.sync_status,
                        version = excluded.version,
                        updated_at = excluded.updated_at,
                        remote_updated_at = excluded.remote_updated_at,
                        is_deleted = excluded.is_deleted,
                        last_error = excluded.last_error,
                        data = excluded.data"
                ),
                params![
                    entity.local_id.as_str(),
                    entity.server_id.as_deref(),
                    entity.sync_status.as_str(),
                    entity.version,
                    entity.created_at,
                    entity.updated_at,
                    entity.remote_updated_at,
                    i64::from(entity.is_deleted),
                    entity.last_error.as_deref(),
                    data
                ],
            )
            .await?;
        Ok(())
    }

    async fn remove_entity(&self, kind: ResourceKind, local_id: &LocalId) -> Result<()> {
        self.conn
            .execute(
                &format!("DELETE FROM {} WHERE local_id = ?", kind.table()),
                [local_id.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn apply_writes(&self, writes: &[StoreWrite]) -> Result<Vec<i64>> {
        let queue = LibSqlQueueRepository::new(self.conn);
        let state = LibSqlSyncStateRepository::new(self.conn);
        let mut enqueued = Vec::new();

        for write in writes {
            match write {
                StoreWrite::PutEntity(entity) => self.put_entity(entity).await?,
                StoreWrite::RemoveEntity { kind, local_id } => {
                    self.remove_entity(*kind, local_id).await?;
                }
                StoreWrite::Enqueue(operation) => enqueued.push(queue.enqueue(operation).await?),
                StoreWrite::Dequeue(id) => {
                    queue.dequeue(*id).await?;
                }
                StoreWrite::CancelOperations { kind, local_id } => {
                    queue.cancel_for_resource(*kind, local_id).await?;
                }
                StoreWrite::RecordFailure { id, failure } => {
                    queue.record_failure(*id, failure).await?;
                }
                StoreWrite::ResetOperation(id) => {
                    queue.reset_failed(Some(*id)).await?;
                }
                StoreWrite::SetState { key, value } => state.set(key, value).await?,
                StoreWrite::LogConflict {
                    kind,
                    local_id,
                    local_updated_at,
                    remote_updated_at,
                    winner,
                } => {
                    state
                        .log_conflict(
                            *kind,
                            local_id,
                            *local_updated_at,
                            *remote_updated_at,
                            *winner,
                        )
                        .await?;
                }
            }
        }

        Ok(enqueued)
    }
}

impl EntityRepository for LibSqlEntityRepository<'_> {
    async fn get(&self, kind: ResourceKind, local_id: &LocalId) -> Result<Option<SyncableEntity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM {} WHERE local_id = ?",
            kind.table()
        );
        let mut entities = self.query_entities(kind, &sql, [local_id.as_str()]).await?;
        Ok(entities.pop())
    }

    async fn find_by_server_id(
        &self,
        kind: ResourceKind,
        server_id: &str,
    ) -> Result<Option<SyncableEntity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM {} WHERE server_id = ?",
            kind.table()
        );
        let mut entities = self.query_entities(kind, &sql, [server_id]).await?;
        Ok(entities.pop())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        include_deleted: bool,
    ) -> Result<Vec<SyncableEntity>> {
        let filter = if include_deleted {
            ""
        } else {
            "WHERE is_deleted = 0"
        };
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM {} {filter} ORDER BY created_at DESC, local_id DESC",
            kind.table()
        );
        self.query_entities(kind, &sql, ()).await
    }

    async fn list_unsynced(&self, kind: ResourceKind) -> Result<Vec<SyncableEntity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM {} WHERE sync_status != 'synced' ORDER BY updated_at ASC",
            kind.table()
        );
        self.query_entities(kind, &sql, ()).await
    }

    async fn apply_batch(&self, writes: &[StoreWrite]) -> Result<Vec<i64>> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }

        self.conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = self.apply_writes(writes).await;
        finish_transaction(self.conn, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Habit, OperationType, SyncStatus, SyncableResource};
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_and_get() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::new(db.connection().unwrap());

        let entity = SyncableEntity::new_local(Habit::new("Meditate").into_data());
        repo.apply_batch(&[StoreWrite::PutEntity(entity.clone())])
            .await
            .unwrap();

        let fetched = repo
            .get(ResourceKind::Habit, &entity.local_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, entity);
        assert!(repo
            .get(ResourceKind::Friend, &entity.local_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_find_by_server_id_and_unsynced_filter() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::new(db.connection().unwrap());

        let synced = SyncableEntity::from_remote("srv-9", 1_000, Habit::new("Run").into_data());
        let pending = SyncableEntity::new_local(Habit::new("Swim").into_data());
        repo.apply_batch(&[
            StoreWrite::PutEntity(synced.clone()),
            StoreWrite::PutEntity(pending.clone()),
        ])
        .await
        .unwrap();

        let found = repo
            .find_by_server_id(ResourceKind::Habit, "srv-9")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.local_id, synced.local_id);
        assert_eq!(found.sync_status, SyncStatus::Synced);

        let unsynced = repo.list_unsynced(ResourceKind::Habit).await.unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].local_id, pending.local_id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_hides_tombstones() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::new(db.connection().unwrap());

        let mut deleted = SyncableEntity::new_local(Habit::new("Gone").into_data());
        deleted.is_deleted = true;
        let kept = SyncableEntity::new_local(Habit::new("Kept").into_data());
        repo.apply_batch(&[
            StoreWrite::PutEntity(deleted),
            StoreWrite::PutEntity(kept.clone()),
        ])
        .await
        .unwrap();

        let visible = repo.list(ResourceKind::Habit, false).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].local_id, kept.local_id);
        assert_eq!(repo.list(ResourceKind::Habit, true).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_batch_is_all_or_nothing() {
        let db = setup().await;
        let conn = db.connection().unwrap();
        let repo = LibSqlEntityRepository::new(conn);

        let first = SyncableEntity::from_remote("srv-1", 1_000, Habit::new("A").into_data());
        repo.apply_batch(&[StoreWrite::PutEntity(first)])
            .await
            .unwrap();

        // Second entity reuses the server id, violating the UNIQUE constraint
        // after its queue operation was already written.
        let clash = SyncableEntity::from_remote("srv-1", 2_000, Habit::new("B").into_data());
        let operation = NewOperation::for_entity(OperationType::Update, &clash).unwrap();
        let result = repo
            .apply_batch(&[
                StoreWrite::Enqueue(operation),
                StoreWrite::PutEntity(clash.clone()),
            ])
            .await;
        assert!(result.is_err());

        let queue = LibSqlQueueRepository::new(conn);
        assert!(queue.list_pending().await.unwrap().is_empty());
        assert!(repo
            .get(ResourceKind::Habit, &clash.local_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_batch_returns_enqueued_ids_in_order() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::new(db.connection().unwrap());

        let entity = SyncableEntity::new_local(Habit::new("Read").into_data());
        let create = NewOperation::for_entity(OperationType::Create, &entity).unwrap();
        let update = NewOperation::for_entity(OperationType::Update, &entity).unwrap();
        let ids = repo
            .apply_batch(&[
                StoreWrite::PutEntity(entity),
                StoreWrite::Enqueue(create),
                StoreWrite::Enqueue(update),
            ])
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert!(ids[0] < ids[1]);
    }
}
