//! Durable operation queue

use crate::error::{Error, Result};
use crate::models::{LocalId, NewOperation, QueuedOperation, ResourceKind};
use libsql::{params, Connection, Row};

const QUEUE_COLUMNS: &str = "id, operation_type, resource_type, resource_local_id, payload, \
                             retry_count, last_attempt_at, next_attempt_at, error, failed, created_at";

/// Outcome of one failed push attempt, as decided by the retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub error: String,
    pub attempted_at: i64,
    /// Earliest next attempt; `None` when the item became terminal
    pub next_attempt_at: Option<i64>,
    pub terminal: bool,
}

/// Trait for queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Append an operation and return its id
    async fn enqueue(&self, operation: &NewOperation) -> Result<i64>;

    /// Remove an operation. Returns `false` when it was already gone.
    async fn dequeue(&self, id: i64) -> Result<bool>;

    /// Every operation still in the queue, terminal ones included, in id order
    async fn list_pending(&self) -> Result<Vec<QueuedOperation>>;

    async fn get(&self, id: i64) -> Result<Option<QueuedOperation>>;

    /// Number of operations that are not terminal
    async fn count_pending(&self) -> Result<usize>;

    /// Terminal operations, in id order
    async fn list_failed(&self) -> Result<Vec<QueuedOperation>>;

    /// Operations targeting one resource, in id order
    async fn list_for_resource(
        &self,
        kind: ResourceKind,
        local_id: &LocalId,
    ) -> Result<Vec<QueuedOperation>>;

    /// Increment the retry counter and store the failure
    async fn record_failure(&self, id: i64, failure: &AttemptFailure) -> Result<()>;

    /// Make terminal operations eligible again. `None` resets all of them.
    /// Returns the number of operations reset.
    async fn reset_failed(&self, id: Option<i64>) -> Result<u64>;

    /// Drop every operation targeting a resource. Returns the number removed.
    async fn cancel_for_resource(&self, kind: ResourceKind, local_id: &LocalId) -> Result<u64>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an operation from a database row
    fn parse_operation(row: &Row) -> Result<QueuedOperation> {
        let operation_type: String = row.get(1)?;
        let resource_type: String = row.get(2)?;
        let resource_local_id: String = row.get(3)?;
        let payload: String = row.get(4)?;
        let retry_count: i64 = row.get(5)?;

        Ok(QueuedOperation {
            id: row.get(0)?,
            operation_type: operation_type.parse()?,
            resource_type: resource_type.parse()?,
            resource_local_id: resource_local_id.parse().map_err(|_| {
                Error::Database(format!("Invalid local id in queue: {resource_local_id}"))
            })?,
            payload: serde_json::from_str(&payload)?,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            last_attempt_at: row.get(6)?,
            next_attempt_at: row.get(7)?,
            error: row.get(8)?,
            failed: row.get::<i64>(9)? != 0,
            created_at: row.get(10)?,
        })
    }

    async fn query_operations(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<QueuedOperation>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut operations = Vec::new();
        while let Some(row) = rows.next().await? {
            operations.push(Self::parse_operation(&row)?);
        }
        Ok(operations)
    }
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn enqueue(&self, operation: &NewOperation) -> Result<i64> {
        let payload = serde_json::to_string(&operation.payload)?;
        self.conn
            .execute(
                "INSERT INTO sync_queue
                    (operation_type, resource_type, resource_local_id, payload, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    operation.operation_type.as_str(),
                    operation.resource_type.as_str(),
                    operation.resource_local_id.as_str(),
                    payload,
                    crate::util::now_millis()
                ],
            )
            .await?;
        let id = self.conn.last_insert_rowid();

        tracing::debug!(
            "Enqueued {} {} {} as #{id}",
            operation.operation_type,
            operation.resource_type,
            operation.resource_local_id
        );
        Ok(id)
    }

    async fn dequeue(&self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM sync_queue WHERE id = ?", [id])
            .await?;
        Ok(removed > 0)
    }

    async fn list_pending(&self) -> Result<Vec<QueuedOperation>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM sync_queue ORDER BY id ASC");
        self.query_operations(&sql, ()).await
    }

    async fn get(&self, id: i64) -> Result<Option<QueuedOperation>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?");
        let mut operations = self.query_operations(&sql, [id]).await?;
        Ok(operations.pop())
    }

    async fn count_pending(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM sync_queue WHERE failed = 0", ())
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn list_failed(&self) -> Result<Vec<QueuedOperation>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE failed = 1 ORDER BY id ASC");
        self.query_operations(&sql, ()).await
    }

    async fn list_for_resource(
        &self,
        kind: ResourceKind,
        local_id: &LocalId,
    ) -> Result<Vec<QueuedOperation>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM sync_queue
             WHERE resource_type = ? AND resource_local_id = ?
             ORDER BY id ASC"
        );
        self.query_operations(&sql, params![kind.as_str(), local_id.as_str()])
            .await
    }

    async fn record_failure(&self, id: i64, failure: &AttemptFailure) -> Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE sync_queue
                 SET retry_count = retry_count + 1,
                     last_attempt_at = ?,
                     next_attempt_at = ?,
                     error = ?,
                     failed = ?
                 WHERE id = ?",
                params![
                    failure.attempted_at,
                    failure.next_attempt_at,
                    failure.error.as_str(),
                    i64::from(failure.terminal),
                    id
                ],
            )
            .await?;

        if updated == 0 {
            tracing::debug!("Operation #{id} was cancelled before its failure was recorded");
        }
        Ok(())
    }

    async fn reset_failed(&self, id: Option<i64>) -> Result<u64> {
        const RESET: &str = "UPDATE sync_queue
                             SET failed = 0, retry_count = 0, next_attempt_at = NULL, error = NULL
                             WHERE failed = 1";
        let reset = match id {
            Some(id) => {
                self.conn
                    .execute(&format!("{RESET} AND id = ?"), [id])
                    .await?
            }
            None => self.conn.execute(RESET, ()).await?,
        };
        Ok(reset)
    }

    async fn cancel_for_resource(&self, kind: ResourceKind, local_id: &LocalId) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM sync_queue WHERE resource_type = ? AND resource_local_id = ?",
                params![kind.as_str(), local_id.as_str()],
            )
            .await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::OperationType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn operation(kind: ResourceKind, local_id: LocalId) -> NewOperation {
        NewOperation {
            operation_type: OperationType::Update,
            resource_type: kind,
            resource_local_id: local_id,
            payload: json!({ "name": "Stretch" }),
        }
    }

    fn failure(terminal: bool) -> AttemptFailure {
        AttemptFailure {
            error: "HTTP 503".to_string(),
            attempted_at: 1_000,
            next_attempt_at: (!terminal).then_some(3_000),
            terminal,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fifo_order() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection().unwrap());

        let a = LocalId::new();
        let b = LocalId::new();
        let first = repo.enqueue(&operation(ResourceKind::Habit, a)).await.unwrap();
        let second = repo.enqueue(&operation(ResourceKind::Friend, b)).await.unwrap();
        let third = repo.enqueue(&operation(ResourceKind::Habit, a)).await.unwrap();

        let ids: Vec<i64> = repo
            .list_pending()
            .await
            .unwrap()
            .iter()
            .map(|op| op.id)
            .collect();
        assert_eq!(ids, vec![first, second, third]);

        let pending = repo.get(second).await.unwrap().unwrap();
        assert_eq!(pending.resource_type, ResourceKind::Friend);
        assert_eq!(pending.payload, json!({ "name": "Stretch" }));
        assert_eq!(pending.retry_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dequeue_reports_missing() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection().unwrap());

        let id = repo
            .enqueue(&operation(ResourceKind::Habit, LocalId::new()))
            .await
            .unwrap();
        assert!(repo.dequeue(id).await.unwrap());
        assert!(!repo.dequeue(id).await.unwrap());
        assert_eq!(repo.count_pending().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ids_are_not_reused() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection().unwrap());

        let first = repo
            .enqueue(&operation(ResourceKind::Habit, LocalId::new()))
            .await
            .unwrap();
        repo.dequeue(first).await.unwrap();
        let second = repo
            .enqueue(&operation(ResourceKind::Habit, LocalId::new()))
            .await
            .unwrap();
        assert!(second > first);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_failure_and_manual_reset() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection().unwrap());

        let retried = repo
            .enqueue(&operation(ResourceKind::Habit, LocalId::new()))
            .await
            .unwrap();
        let terminal = repo
            .enqueue(&operation(ResourceKind::Habit, LocalId::new()))
            .await
            .unwrap();

        repo.record_failure(retried, &failure(false)).await.unwrap();
        repo.record_failure(terminal, &failure(true)).await.unwrap();

        let op = repo.get(retried).await.unwrap().unwrap();
        assert_eq!(op.retry_count, 1);
        assert_eq!(op.next_attempt_at, Some(3_000));
        assert_eq!(op.last_attempt_at, Some(1_000));
        assert!(!op.failed);

        assert_eq!(repo.count_pending().await.unwrap(), 1);
        let failed = repo.list_failed().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, terminal);
        assert_eq!(failed[0].error.as_deref(), Some("HTTP 503"));

        assert_eq!(repo.reset_failed(None).await.unwrap(), 1);
        let op = repo.get(terminal).await.unwrap().unwrap();
        assert!(!op.failed);
        assert_eq!(op.retry_count, 0);
        assert!(op.error.is_none());
        assert!(repo.list_failed().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reset_single_failed_operation() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection().unwrap());

        let a = repo
            .enqueue(&operation(ResourceKind::Habit, LocalId::new()))
            .await
            .unwrap();
        let b = repo
            .enqueue(&operation(ResourceKind::Habit, LocalId::new()))
            .await
            .unwrap();
        repo.record_failure(a, &failure(true)).await.unwrap();
        repo.record_failure(b, &failure(true)).await.unwrap();

        assert_eq!(repo.reset_failed(Some(b)).await.unwrap(), 1);
        assert_eq!(repo.reset_failed(Some(b)).await.unwrap(), 0);
        let failed: Vec<i64> = repo
            .list_failed()
            .await
            .unwrap()
            .iter()
            .map(|op| op.id)
            .collect();
        assert_eq!(failed, vec![a]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_for_resource() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection().unwrap());

        let target = LocalId::new();
        let other = LocalId::new();
        repo.enqueue(&operation(ResourceKind::Habit, target)).await.unwrap();
        repo.enqueue(&operation(ResourceKind::Habit, other)).await.unwrap();
        let failed = repo.enqueue(&operation(ResourceKind::Habit, target)).await.unwrap();
        repo.record_failure(failed, &failure(true)).await.unwrap();

        let removed = repo
            .cancel_for_resource(ResourceKind::Habit, &target)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(repo
            .list_for_resource(ResourceKind::Habit, &target)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(repo.list_pending().await.unwrap().len(), 1);
    }
}
