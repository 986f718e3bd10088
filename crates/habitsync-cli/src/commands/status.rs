use std::path::Path;

use habitsync_core::state::{EngineStatus, SyncPhase, SyncState};
use habitsync_core::util::now_millis;
use habitsync_core::{RemoteConfig, SyncEngineConfig, SyncStore};
use serde::Serialize;

use crate::commands::common::{format_relative_time, format_sync_timestamp, open_engine, open_store};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusItem {
    pub state: SyncState,
    pub remote_configured: bool,
    #[serde(flatten)]
    pub status: EngineStatus,
}

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let remote_configured = RemoteConfig::from_env()?.is_some();
    let status = if remote_configured {
        open_engine(store.clone(), true, SyncEngineConfig::default())?
            .status()
            .await?
    } else {
        local_status(&store).await?
    };
    store.close().await;

    let item = StatusItem {
        state: status.state(),
        remote_configured,
        status,
    };
    if as_json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        for line in format_status_lines(&item, now_millis()) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Queue state when no remote is configured; nothing can be pushed.
async fn local_status(store: &SyncStore) -> Result<EngineStatus, CliError> {
    let failed = store.list_failed_operations().await?;
    Ok(EngineStatus {
        online: false,
        syncing: false,
        phase: SyncPhase::Idle,
        pending_operations: store.count_pending_operations().await?,
        failed_operations: failed.len(),
        last_sync_at: store.last_sync_completed_at().await?,
        errors: failed.into_iter().filter_map(|operation| operation.error).collect(),
    })
}

pub fn format_status_lines(item: &StatusItem, now_ms: i64) -> Vec<String> {
    let status = &item.status;
    let last_sync = status.last_sync_at.map_or_else(
        || "never".to_string(),
        |at| format!("{} ({})", format_sync_timestamp(at), format_relative_time(at, now_ms)),
    );

    let mut lines = vec![
        format!("State:              {}", item.state),
        format!(
            "Remote:             {}",
            if item.remote_configured { "configured" } else { "not configured" }
        ),
        format!("Pending operations: {}", status.pending_operations),
        format!("Failed operations:  {}", status.failed_operations),
        format!("Last sync:          {last_sync}"),
    ];
    if !status.errors.is_empty() {
        lines.push("Errors:".to_string());
        lines.extend(status.errors.iter().map(|error| format!("  - {error}")));
    }
    lines
}
