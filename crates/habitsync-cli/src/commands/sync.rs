use std::path::Path;

use habitsync_core::sync::{SyncOutcome, SyncReport};
use habitsync_core::SyncEngineConfig;

use crate::commands::common::{
    format_sync_conflict_lines, open_engine, open_store, sync_conflict_to_item, SyncConflictItem,
};
use crate::error::CliError;

pub async fn run_sync(offline: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let engine = open_engine(store.clone(), !offline, SyncEngineConfig::default())?;

    let outcome = engine.sync().await;
    let pending = store.count_pending_operations().await;
    store.close().await;

    match outcome? {
        SyncOutcome::Completed(report) => {
            println!("{}", format_sync_report(&report));
            if report.failed > 0 {
                println!("Some changes failed to sync; see `habitsync queue list`.");
            }
        }
        SyncOutcome::Skipped(reason) => {
            println!("Sync skipped: {reason}");
            if let Ok(pending) = pending {
                println!("{pending} change(s) waiting to sync");
            }
        }
    }
    Ok(())
}

pub fn format_sync_report(report: &SyncReport) -> String {
    let mut summary = format!(
        "Sync completed: {} pushed, {} pulled",
        report.pushed, report.pulled
    );
    for (count, label) in [
        (report.failed, "failed"),
        (report.deferred, "deferred"),
        (report.kept_local, "kept local"),
        (report.malformed, "skipped as malformed"),
    ] {
        if count > 0 {
            summary.push_str(&format!(", {count} {label}"));
        }
    }
    summary
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let conflicts = store.list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
