//! Sync bookkeeping: pull watermark, last completed pass, and the conflict log

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::{Error, Result};
use crate::models::{LocalId, Resolution, ResourceKind, SyncConflict};
use libsql::{params, Connection};

pub(crate) const WATERMARK_KEY: &str = "last_pull_at";
pub(crate) const LAST_SYNC_KEY: &str = "last_sync_completed_at";

/// Trait for sync state storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncStateRepository {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Server timestamp the next pull starts from; `None` pulls everything
    async fn watermark(&self) -> Result<Option<i64>>;

    async fn last_sync_completed_at(&self) -> Result<Option<i64>>;

    /// Append a resolved conflict to the log
    async fn log_conflict(
        &self,
        kind: ResourceKind,
        local_id: &LocalId,
        local_updated_at: i64,
        remote_updated_at: i64,
        winner: Resolution,
    ) -> Result<()>;

    /// Most recent conflicts first
    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// libSQL implementation of `SyncStateRepository`
pub struct LibSqlSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn get_millis(&self, key: &str) -> Result<Option<i64>> {
        self.get(key)
            .await?
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| Error::Database(format!("Invalid {key} value: {value}")))
            })
            .transpose()
    }
}

impl SyncStateRepository for LibSqlSyncStateRepository<'_> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_state WHERE key = ?", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn watermark(&self) -> Result<Option<i64>> {
        self.get_millis(WATERMARK_KEY).await
    }

    async fn last_sync_completed_at(&self) -> Result<Option<i64>> {
        self.get_millis(LAST_SYNC_KEY).await
    }

    async fn log_conflict(
        &self,
        kind: ResourceKind,
        local_id: &LocalId,
        local_updated_at: i64,
        remote_updated_at: i64,
        winner: Resolution,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_conflicts
                    (resource_type, local_id, local_updated_at, remote_updated_at, winner, resolved_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    kind.as_str(),
                    local_id.as_str(),
                    local_updated_at,
                    remote_updated_at,
                    winner.as_str(),
                    crate::util::now_millis()
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, resource_type, local_id, local_updated_at, remote_updated_at, winner, resolved_at
                 FROM sync_conflicts
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?",
                [limit as i64],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            let resource_type: String = row.get(1)?;
            let local_id: String = row.get(2)?;
            let winner: String = row.get(5)?;
            conflicts.push(SyncConflict {
                id: row.get(0)?,
                resource_type: resource_type.parse()?,
                local_id: local_id.parse().map_err(|_| {
                    Error::Database(format!("Invalid local id in conflict log: {local_id}"))
                })?,
                local_updated_at: row.get(3)?,
                remote_updated_at: row.get(4)?,
                winner: winner.parse()?,
                resolved_at: row.get(6)?,
            });
        }
        Ok(conflicts)
    }
}
