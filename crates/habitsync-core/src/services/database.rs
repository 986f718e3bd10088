//! Shared store service used by the sync engine and every client.
//!
//! Each application mutation writes the entity and its queued operation in a
//! single transaction, so the queue never misses a local change.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::db::{
    AttemptFailure, Database, EntityRepository, LibSqlEntityRepository, LibSqlQueueRepository,
    LibSqlSyncStateRepository, QueueRepository, StoreWrite, SyncStateRepository, LAST_SYNC_KEY,
    WATERMARK_KEY,
};
use crate::error::{Error, Result};
use crate::models::{
    Challenge, Friend, FriendStatus, Habit, HabitCompletion, HabitFrequency, LocalId,
    NewOperation, Notification, OperationType, QueuedOperation, Resolution, ResourceData,
    ResourceKind, SyncConflict, SyncStatus, SyncableEntity, SyncableResource,
};
use crate::sync::{resolve, RemoteRecord};

/// Changes to apply to a habit; `None` leaves a field as it is
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HabitPatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
    pub frequency: Option<HabitFrequency>,
}

/// What reconciling one pulled record did to local state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reconciled {
    /// New remote-only entity stored locally
    Inserted,
    /// Remote state overwrote the local entity
    Updated,
    /// Remote tombstone removed the local entity
    Removed,
    /// Local edits are newer; left for the next push
    KeptLocal,
    /// Local state already matches
    Unchanged,
    /// Tombstone for an entity this device never had
    Ignored,
}

/// Thread-safe service for store and queue operations.
#[derive(Clone)]
pub struct SyncStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl SyncStore {
    /// Open a store at the given filesystem path, creating parent directories.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::debug!("Opening store at {}", db_path.display());
        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Returns the file path when this store is file-backed.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Close the store. Every later call fails with [`Error::StoreClosed`].
    pub async fn close(&self) {
        self.db.lock().await.close();
    }

    pub async fn is_closed(&self) -> bool {
        self.db.lock().await.is_closed()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Create a habit.
    pub async fn create_habit(&self, habit: Habit) -> Result<SyncableEntity> {
        let name = habit.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Habit name cannot be empty".to_string()));
        }
        let habit = Habit {
            name: name.to_string(),
            ..habit
        };
        self.insert_local(habit.into_data()).await
    }

    /// Apply a patch to a habit.
    pub async fn update_habit(&self, local_id: &LocalId, patch: HabitPatch) -> Result<SyncableEntity> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(Error::InvalidInput("Habit name cannot be empty".to_string()));
            }
        }

        self.edit::<Habit>(local_id, move |habit| {
            let before = habit.clone();
            if let Some(name) = patch.name {
                habit.name = name.trim().to_string();
            }
            if let Some(description) = patch.description {
                habit.description = description;
            }
            if let Some(frequency) = patch.frequency {
                habit.frequency = frequency;
            }
            Ok(*habit != before)
        })
        .await
    }

    /// Archive a habit; archived habits accept no further completions.
    pub async fn archive_habit(&self, local_id: &LocalId) -> Result<SyncableEntity> {
        self.edit::<Habit>(local_id, |habit| {
            let changed = !habit.archived;
            habit.archived = true;
            Ok(changed)
        })
        .await
    }

    /// Record a completion and update the habit's streaks in one write.
    ///
    /// Returns the updated habit and the new completion.
    pub async fn complete_habit(
        &self,
        habit_local_id: &LocalId,
        on: NaiveDate,
        note: Option<String>,
    ) -> Result<(SyncableEntity, SyncableEntity)> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection()?);

        let mut habit = live_entity(&repo, ResourceKind::Habit, habit_local_id).await?;
        typed_mut::<Habit>(&mut habit)?.record_completion(on)?;
        habit.touch();

        let completion = SyncableEntity::new_local(
            HabitCompletion {
                habit_local_id: Some(habit.local_id),
                habit_id: habit.server_id.clone(),
                completed_on: on,
                note: crate::util::normalize_text_option(note),
            }
            .into_data(),
        );

        repo.apply_batch(&[
            StoreWrite::PutEntity(habit.clone()),
            StoreWrite::Enqueue(NewOperation::for_entity(OperationType::Update, &habit)?),
            StoreWrite::PutEntity(completion.clone()),
            StoreWrite::Enqueue(NewOperation::for_entity(OperationType::Create, &completion)?),
        ])
        .await?;

        tracing::debug!("Completed habit {habit_local_id} on {on}");
        Ok((habit, completion))
    }

    /// Create a challenge.
    pub async fn create_challenge(&self, challenge: Challenge) -> Result<SyncableEntity> {
        if challenge.title.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Challenge title cannot be empty".to_string(),
            ));
        }
        self.insert_local(challenge.into_data()).await
    }

    /// Add a participant to a challenge. Joining twice is a no-op.
    pub async fn join_challenge(&self, local_id: &LocalId, user_id: &str) -> Result<SyncableEntity> {
        let user_id = user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(Error::InvalidInput("User id cannot be empty".to_string()));
        }
        self.edit::<Challenge>(local_id, move |challenge| Ok(challenge.join(user_id)))
            .await
    }

    /// Add a friend (pending until accepted).
    pub async fn add_friend(&self, user_id: &str, display_name: &str) -> Result<SyncableEntity> {
        if user_id.trim().is_empty() {
            return Err(Error::InvalidInput("User id cannot be empty".to_string()));
        }
        self.insert_local(Friend::new(user_id.trim(), display_name.trim()).into_data())
            .await
    }

    pub async fn set_friend_status(
        &self,
        local_id: &LocalId,
        status: FriendStatus,
    ) -> Result<SyncableEntity> {
        self.edit::<Friend>(local_id, |friend| {
            let changed = friend.status != status;
            friend.status = status;
            Ok(changed)
        })
        .await
    }

    pub async fn create_notification(&self, notification: Notification) -> Result<SyncableEntity> {
        if notification.title.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Notification title cannot be empty".to_string(),
            ));
        }
        self.insert_local(notification.into_data()).await
    }

    pub async fn mark_notification_read(&self, local_id: &LocalId) -> Result<SyncableEntity> {
        self.edit::<Notification>(local_id, |notification| {
            let changed = !notification.read;
            notification.read = true;
            Ok(changed)
        })
        .await
    }

    /// Delete an entity of any kind.
    ///
    /// The entity stays as a hidden tombstone until the remote delete is
    /// confirmed; operations still queued for it are superseded.
    pub async fn delete(&self, kind: ResourceKind, local_id: &LocalId) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection()?);

        let mut entity = live_entity(&repo, kind, local_id).await?;
        entity.is_deleted = true;
        entity.touch();

        repo.apply_batch(&[
            StoreWrite::CancelOperations {
                kind,
                local_id: *local_id,
            },
            StoreWrite::PutEntity(entity.clone()),
            StoreWrite::Enqueue(NewOperation::for_entity(OperationType::Delete, &entity)?),
        ])
        .await?;

        tracing::debug!("Deleted {kind} {local_id}");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Fetch an entity; tombstones are hidden.
    pub async fn get(&self, kind: ResourceKind, local_id: &LocalId) -> Result<Option<SyncableEntity>> {
        Ok(self
            .entity_any(kind, local_id)
            .await?
            .filter(|entity| !entity.is_deleted))
    }

    /// Fetch the typed resource of a live entity.
    pub async fn get_resource<T: SyncableResource + Clone>(&self, local_id: &LocalId) -> Result<Option<T>> {
        Ok(self
            .get(T::KIND, local_id)
            .await?
            .and_then(|entity| entity.resource::<T>().cloned()))
    }

    /// List live entities of a kind, newest first.
    pub async fn list(&self, kind: ResourceKind) -> Result<Vec<SyncableEntity>> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection()?);
        repo.list(kind, false).await
    }

    pub async fn find_by_server_id(
        &self,
        kind: ResourceKind,
        server_id: &str,
    ) -> Result<Option<SyncableEntity>> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection()?);
        repo.find_by_server_id(kind, server_id).await
    }

    /// Entities with changes the remote has not confirmed yet.
    pub async fn list_unsynced(&self, kind: ResourceKind) -> Result<Vec<SyncableEntity>> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection()?);
        repo.list_unsynced(kind).await
    }

    /// Every queued operation, terminal ones included, in queue order.
    pub async fn list_pending_operations(&self) -> Result<Vec<QueuedOperation>> {
        let db = self.db.lock().await;
        let queue = LibSqlQueueRepository::new(db.connection()?);
        queue.list_pending().await
    }

    pub async fn count_pending_operations(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let queue = LibSqlQueueRepository::new(db.connection()?);
        queue.count_pending().await
    }

    pub async fn list_failed_operations(&self) -> Result<Vec<QueuedOperation>> {
        let db = self.db.lock().await;
        let queue = LibSqlQueueRepository::new(db.connection()?);
        queue.list_failed().await
    }

    /// Server timestamp the next pull starts from.
    pub async fn watermark(&self) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        let state = LibSqlSyncStateRepository::new(db.connection()?);
        state.watermark().await
    }

    pub async fn last_sync_completed_at(&self) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        let state = LibSqlSyncStateRepository::new(db.connection()?);
        state.last_sync_completed_at().await
    }

    /// List recent sync conflict events.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        let state = LibSqlSyncStateRepository::new(db.connection()?);
        state.list_conflicts(limit).await
    }

    // -----------------------------------------------------------------------
    // Manual queue intervention
    // -----------------------------------------------------------------------

    /// Make a terminally failed operation eligible again.
    ///
    /// Returns `false` when no failed operation has this id.
    pub async fn retry_failed(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection()?;
        let queue = LibSqlQueueRepository::new(conn);
        let repo = LibSqlEntityRepository::new(conn);

        let Some(operation) = queue.get(id).await?.filter(|op| op.failed) else {
            return Ok(false);
        };

        let mut writes = vec![StoreWrite::ResetOperation(id)];
        if let Some(mut entity) = repo
            .get(operation.resource_type, &operation.resource_local_id)
            .await?
        {
            entity.sync_status = SyncStatus::Pending;
            entity.last_error = None;
            writes.push(StoreWrite::PutEntity(entity));
        }
        repo.apply_batch(&writes).await?;

        tracing::info!("Operation #{id} queued for retry");
        Ok(true)
    }

    /// Make every terminally failed operation eligible again.
    pub async fn retry_all_failed(&self) -> Result<usize> {
        let failed = self.list_failed_operations().await?;
        let mut reset = 0;
        for operation in failed {
            if self.retry_failed(operation.id).await? {
                reset += 1;
            }
        }
        Ok(reset)
    }

    /// Drop a queued operation without sending it.
    ///
    /// When it was the last operation for its entity, the entity is marked
    /// `error` (or removed, for a tombstone) so it is never left pending
    /// without queued work.
    pub async fn discard_operation(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection()?;
        let queue = LibSqlQueueRepository::new(conn);
        let repo = LibSqlEntityRepository::new(conn);

        let Some(operation) = queue.get(id).await? else {
            return Ok(false);
        };
        let kind = operation.resource_type;
        let local_id = operation.resource_local_id;

        let mut writes = vec![StoreWrite::Dequeue(id)];
        let others_remaining = queue
            .list_for_resource(kind, &local_id)
            .await?
            .iter()
            .any(|other| other.id != id);

        if !others_remaining {
            if let Some(mut entity) = repo.get(kind, &local_id).await? {
                if entity.is_deleted {
                    writes.push(StoreWrite::RemoveEntity { kind, local_id });
                } else if entity.has_local_edits() {
                    entity.sync_status = SyncStatus::Error;
                    entity.last_error = Some(format!("Operation #{id} was discarded"));
                    writes.push(StoreWrite::PutEntity(entity));
                }
            }
        }
        repo.apply_batch(&writes).await?;

        tracing::warn!("Discarded {} operation #{id} for {kind} {local_id}", operation.operation_type);
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Sync engine steps
    // -----------------------------------------------------------------------

    /// Fetch an entity including tombstones.
    pub(crate) async fn entity_any(
        &self,
        kind: ResourceKind,
        local_id: &LocalId,
    ) -> Result<Option<SyncableEntity>> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection()?);
        repo.get(kind, local_id).await
    }

    /// Apply a successful push.
    ///
    /// Returns `false` when the operation was cancelled while its call was in
    /// flight; only the server id is recorded then, so the remote record is
    /// not orphaned.
    pub(crate) async fn confirm_push(
        &self,
        operation: &QueuedOperation,
        record: Option<&RemoteRecord>,
        habit_server_id: Option<&str>,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection()?;
        let queue = LibSqlQueueRepository::new(conn);
        let repo = LibSqlEntityRepository::new(conn);

        let kind = operation.resource_type;
        let local_id = operation.resource_local_id;
        let entity = repo.get(kind, &local_id).await?;

        if queue.get(operation.id).await?.is_none() {
            if let (Some(mut entity), Some(record)) = (entity, record) {
                if entity.server_id.is_none() {
                    tracing::debug!(
                        "Recording server id {} for {kind} {local_id} after cancelled push",
                        record.server_id
                    );
                    entity.server_id = Some(record.server_id.clone());
                    repo.apply_batch(&[StoreWrite::PutEntity(entity)]).await?;
                }
            }
            return Ok(false);
        }

        let mut writes = vec![StoreWrite::Dequeue(operation.id)];
        if let Some(mut entity) = entity {
            if operation.operation_type == OperationType::Delete {
                writes.push(StoreWrite::RemoveEntity { kind, local_id });
            } else {
                if let Some(record) = record {
                    entity.server_id = Some(record.server_id.clone());
                    entity.remote_updated_at = Some(record.updated_at);
                }
                if let (Some(habit_id), Some(completion)) =
                    (habit_server_id, entity.resource_mut::<HabitCompletion>())
                {
                    completion.habit_id = Some(habit_id.to_string());
                }

                let others_remaining = queue
                    .list_for_resource(kind, &local_id)
                    .await?
                    .iter()
                    .any(|other| other.id != operation.id);
                if !others_remaining && entity.server_id.is_some() {
                    entity.sync_status = SyncStatus::Synced;
                    entity.last_error = None;
                }
                writes.push(StoreWrite::PutEntity(entity));
            }
        }

        repo.apply_batch(&writes).await?;
        Ok(true)
    }

    /// Store a failed push attempt; a terminal failure also marks the entity.
    ///
    /// Returns `false` when the operation no longer exists.
    pub(crate) async fn record_push_failure(
        &self,
        operation: &QueuedOperation,
        failure: AttemptFailure,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection()?;
        let queue = LibSqlQueueRepository::new(conn);
        let repo = LibSqlEntityRepository::new(conn);

        if queue.get(operation.id).await?.is_none() {
            return Ok(false);
        }

        let mut writes = Vec::with_capacity(2);
        if failure.terminal {
            if let Some(mut entity) = repo
                .get(operation.resource_type, &operation.resource_local_id)
                .await?
            {
                entity.sync_status = SyncStatus::Error;
                entity.last_error = Some(failure.error.clone());
                writes.push(StoreWrite::PutEntity(entity));
            }
        }
        writes.insert(
            0,
            StoreWrite::RecordFailure {
                id: operation.id,
                failure,
            },
        );

        repo.apply_batch(&writes).await?;
        Ok(true)
    }

    /// Merge one pulled record into local state.
    pub(crate) async fn reconcile_record(
        &self,
        kind: ResourceKind,
        record: &RemoteRecord,
    ) -> Result<Reconciled> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection()?);

        let mut local = repo.find_by_server_id(kind, &record.server_id).await?;
        let mut claimed = false;
        if local.is_none() {
            if let Some(mut own) = find_by_client_key(&repo, kind, record).await? {
                if let Some(server_id) = &own.server_id {
                    tracing::warn!(
                        "Ignoring duplicate {kind} {} of {} ({server_id})",
                        record.server_id,
                        own.local_id
                    );
                    return Ok(Reconciled::Ignored);
                }
                tracing::info!(
                    "Matched {kind} {} to local {} whose create response was lost",
                    record.server_id,
                    own.local_id
                );
                own.server_id = Some(record.server_id.clone());
                claimed = true;
                local = Some(own);
            }
        }
        let remote_data = if record.deleted {
            None
        } else {
            Some(decode_remote(&repo, kind, record).await?)
        };

        let Some(mut local) = local else {
            let Some(data) = remote_data else {
                return Ok(Reconciled::Ignored);
            };
            let entity = SyncableEntity::from_remote(&record.server_id, record.updated_at, data);
            repo.apply_batch(&[StoreWrite::PutEntity(entity)]).await?;
            return Ok(Reconciled::Inserted);
        };

        let unchanged = !local.has_local_edits()
            && !local.is_deleted
            && local.remote_updated_at == Some(record.updated_at)
            && remote_data.as_ref() == Some(&local.data);
        if unchanged {
            return Ok(Reconciled::Unchanged);
        }

        let winner = resolve(&local, record);
        let mut writes = Vec::new();
        if local.has_local_edits() {
            tracing::warn!(
                "Conflict on {kind} {}: local {} vs remote {}, keeping {winner}",
                local.local_id,
                local.updated_at,
                record.updated_at
            );
            writes.push(StoreWrite::LogConflict {
                kind,
                local_id: local.local_id,
                local_updated_at: local.updated_at,
                remote_updated_at: record.updated_at,
                winner,
            });
        }

        let outcome = match (winner, remote_data) {
            (Resolution::Local, _) => {
                if claimed {
                    writes.push(StoreWrite::PutEntity(local));
                }
                Reconciled::KeptLocal
            }
            (Resolution::Remote, None) => {
                writes.push(StoreWrite::CancelOperations {
                    kind,
                    local_id: local.local_id,
                });
                writes.push(StoreWrite::RemoveEntity {
                    kind,
                    local_id: local.local_id,
                });
                Reconciled::Removed
            }
            (Resolution::Remote, Some(data)) => {
                writes.push(StoreWrite::CancelOperations {
                    kind,
                    local_id: local.local_id,
                });
                local.adopt_remote(&record.server_id, record.updated_at, data);
                writes.push(StoreWrite::PutEntity(local));
                Reconciled::Updated
            }
        };

        repo.apply_batch(&writes).await?;
        Ok(outcome)
    }

    /// Advance the watermark (never backwards) and stamp the completed pass.
    pub(crate) async fn finish_pass(&self, as_of: i64) -> Result<i64> {
        let db = self.db.lock().await;
        let conn = db.connection()?;
        let state = LibSqlSyncStateRepository::new(conn);
        let repo = LibSqlEntityRepository::new(conn);

        let watermark = state
            .watermark()
            .await?
            .map_or(as_of, |previous| previous.max(as_of));
        repo.apply_batch(&[
            StoreWrite::SetState {
                key: WATERMARK_KEY.to_string(),
                value: watermark.to_string(),
            },
            StoreWrite::SetState {
                key: LAST_SYNC_KEY.to_string(),
                value: crate::util::now_millis().to_string(),
            },
        ])
        .await?;
        Ok(watermark)
    }

    // -----------------------------------------------------------------------
    // Private
    // -----------------------------------------------------------------------

    async fn insert_local(&self, data: ResourceData) -> Result<SyncableEntity> {
        let entity = SyncableEntity::new_local(data);
        let operation = NewOperation::for_entity(OperationType::Create, &entity)?;

        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection()?);
        repo.apply_batch(&[
            StoreWrite::PutEntity(entity.clone()),
            StoreWrite::Enqueue(operation),
        ])
        .await?;

        tracing::debug!("Created {} {}", entity.kind(), entity.local_id);
        Ok(entity)
    }

    /// Edit the resource of a live entity. The closure returns whether it
    /// changed anything; unchanged entities are not re-queued.
    async fn edit<T: SyncableResource>(
        &self,
        local_id: &LocalId,
        edit: impl FnOnce(&mut T) -> Result<bool> + Send,
    ) -> Result<SyncableEntity> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection()?);

        let mut entity = live_entity(&repo, T::KIND, local_id).await?;
        if !edit(typed_mut::<T>(&mut entity)?)? {
            return Ok(entity);
        }
        entity.touch();

        let operation = NewOperation::for_entity(OperationType::Update, &entity)?;
        repo.apply_batch(&[
            StoreWrite::PutEntity(entity.clone()),
            StoreWrite::Enqueue(operation),
        ])
        .await?;

        tracing::debug!("Updated {} {local_id}", T::KIND);
        Ok(entity)
    }
}

async fn live_entity(
    repo: &LibSqlEntityRepository<'_>,
    kind: ResourceKind,
    local_id: &LocalId,
) -> Result<SyncableEntity> {
    repo.get(kind, local_id)
        .await?
        .filter(|entity| !entity.is_deleted)
        .ok_or_else(|| Error::NotFound(format!("{kind} {local_id}")))
}

fn typed_mut<T: SyncableResource>(entity: &mut SyncableEntity) -> Result<&mut T> {
    let kind = entity.kind();
    entity
        .resource_mut::<T>()
        .ok_or_else(|| Error::Database(format!("Expected {} data, found {kind}", T::KIND)))
}

/// Local entity named by a pulled record's client key.
async fn find_by_client_key(
    repo: &LibSqlEntityRepository<'_>,
    kind: ResourceKind,
    record: &RemoteRecord,
) -> Result<Option<SyncableEntity>> {
    match record.client_key() {
        Some(local_id) => repo.get(kind, &local_id).await,
        None => Ok(None),
    }
}

/// Parse pulled fields, mapping a completion's habit server id to the local habit.
async fn decode_remote(
    repo: &LibSqlEntityRepository<'_>,
    kind: ResourceKind,
    record: &RemoteRecord,
) -> Result<ResourceData> {
    let mut data = ResourceData::from_fields(kind, record.fields.clone())?;
    if let ResourceData::HabitCompletion(completion) = &mut data {
        completion.habit_local_id = match completion.habit_id.as_deref() {
            Some(habit_id) => repo
                .find_by_server_id(ResourceKind::Habit, habit_id)
                .await?
                .map(|habit| habit.local_id),
            None => None,
        };
    }
    Ok(data)
}
