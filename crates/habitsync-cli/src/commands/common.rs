use std::env;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use habitsync_core::models::{
    Habit, HabitFrequency, QueuedOperation, SyncConflict, SyncStatus, SyncableEntity,
};
use habitsync_core::{
    HttpGateway, LocalId, NetworkMonitor, RemoteConfig, ResourceKind, SyncEngine,
    SyncEngineConfig, SyncStore,
};
use serde::Serialize;

use crate::error::CliError;

pub const DB_PATH_ENV: &str = "HABITSYNC_DB_PATH";

#[derive(Debug, Serialize)]
pub struct HabitListItem {
    pub id: String,
    pub server_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub frequency: HabitFrequency,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_completed_on: Option<NaiveDate>,
    pub archived: bool,
    pub sync_status: SyncStatus,
    pub updated_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct OperationItem {
    pub id: i64,
    pub operation: String,
    pub resource: String,
    pub resource_id: String,
    pub retry_count: u32,
    pub next_attempt_at: Option<i64>,
    pub failed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub resource: String,
    pub local_id: String,
    pub local_updated_at: i64,
    pub remote_updated_at: i64,
    pub winner: String,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match cli_db_path.or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from)) {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("habitsync").join("habitsync.db"))
        .ok_or(CliError::NoDataDir)
}

pub async fn open_store(path: &Path) -> Result<SyncStore, CliError> {
    Ok(SyncStore::open_path(path.to_path_buf()).await?)
}

/// Engine backed by the HTTP API configured in the environment.
pub fn open_engine(
    store: SyncStore,
    online: bool,
    config: SyncEngineConfig,
) -> Result<SyncEngine<HttpGateway>, CliError> {
    let remote = RemoteConfig::from_env()?.ok_or(CliError::SyncNotConfigured)?;
    let gateway = HttpGateway::new(&remote, config.request_timeout)?;
    Ok(SyncEngine::new(
        store,
        gateway,
        NetworkMonitor::new(online),
        config,
    ))
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a live entity by full local id, unique local id prefix, or server id.
pub async fn resolve_entity(
    store: &SyncStore,
    kind: ResourceKind,
    query: &str,
) -> Result<SyncableEntity, CliError> {
    let query = normalize_identifier(query)?;
    if let Ok(local_id) = query.parse::<LocalId>() {
        if let Some(entity) = store.get(kind, &local_id).await? {
            return Ok(entity);
        }
    }

    let mut matching = store
        .list(kind)
        .await?
        .into_iter()
        .filter(|entity| {
            entity.local_id.to_string().starts_with(&query)
                || entity.server_id.as_deref() == Some(query.as_str())
        })
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::NotFound(kind.as_str(), query)),
        1 => Ok(matching.remove(0)),
        count => {
            let options = matching
                .iter()
                .take(3)
                .map(|entity| entity.local_id.to_string().chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousId(format!(
                "{count} {kind} entries match {query:?}: {options}"
            )))
        }
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| CliError::InvalidDate(value.to_string()))
}

pub fn habit_to_item(entity: &SyncableEntity, now_ms: i64) -> Option<HabitListItem> {
    let habit = entity.resource::<Habit>()?;
    Some(HabitListItem {
        id: entity.local_id.to_string(),
        server_id: entity.server_id.clone(),
        name: habit.name.clone(),
        description: habit.description.clone(),
        frequency: habit.frequency,
        current_streak: habit.current_streak,
        longest_streak: habit.longest_streak,
        last_completed_on: habit.last_completed_on,
        archived: habit.archived,
        sync_status: entity.sync_status,
        updated_at: entity.updated_at,
        relative_time: format_relative_time(entity.updated_at, now_ms),
    })
}

pub fn format_habit_lines(items: &[HabitListItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let short_id = item.id.chars().take(13).collect::<String>();
            let status = if item.sync_status == SyncStatus::Synced {
                String::new()
            } else {
                format!("  [{}]", item.sync_status)
            };
            let archived = if item.archived { "  (archived)" } else { "" };
            format!(
                "{short_id}  {:<24}  streak {:>3} (best {:>3})  {}{archived}{status}",
                item.name, item.current_streak, item.longest_streak, item.relative_time
            )
        })
        .collect()
}

pub fn operation_to_item(operation: &QueuedOperation) -> OperationItem {
    OperationItem {
        id: operation.id,
        operation: operation.operation_type.to_string(),
        resource: operation.resource_type.to_string(),
        resource_id: operation.resource_local_id.to_string(),
        retry_count: operation.retry_count,
        next_attempt_at: operation.next_attempt_at,
        failed: operation.failed,
        error: operation.error.clone(),
    }
}

pub fn format_operation_lines(operations: &[QueuedOperation]) -> Vec<String> {
    operations
        .iter()
        .map(|operation| {
            let state = if operation.failed {
                "failed".to_string()
            } else if let Some(at) = operation.next_attempt_at {
                format!("retry at {}", format_sync_timestamp(at))
            } else {
                "pending".to_string()
            };
            let mut line = format!(
                "#{:<5} {:<6} {:<18} {}  attempts={}  {state}",
                operation.id,
                operation.operation_type,
                operation.resource_type,
                operation.resource_local_id,
                operation.retry_count
            );
            if let Some(error) = &operation.error {
                line.push_str("  error=");
                line.push_str(error);
            }
            line
        })
        .collect()
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        resource: conflict.resource_type.to_string(),
        local_id: conflict.local_id.to_string(),
        local_updated_at: conflict.local_updated_at,
        remote_updated_at: conflict.remote_updated_at,
        winner: conflict.winner.to_string(),
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  kept={:<6}  {}={}  local={} remote={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.winner,
                conflict.resource_type,
                conflict.local_id,
                conflict.local_updated_at,
                conflict.remote_updated_at
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}
