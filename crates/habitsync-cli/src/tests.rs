use std::path::PathBuf;

use habitsync_core::models::{Resolution, SyncConflict};
use habitsync_core::state::{EngineStatus, SyncPhase, SyncState};
use habitsync_core::sync::SyncReport;
use habitsync_core::{LocalId, ResourceKind};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::cli::FrequencyArg;
use crate::commands::common::{
    format_relative_time, format_sync_conflict_lines, format_sync_timestamp, normalize_identifier,
    open_store, parse_date, resolve_db_path, resolve_entity,
};
use crate::commands::habit::{list_habit_items, run_habit_add, run_habit_complete, run_habit_delete};
use crate::commands::queue::{run_queue_discard, run_queue_retry};
use crate::commands::social::{run_challenge_add, run_challenge_join};
use crate::commands::status::{format_status_lines, StatusItem};
use crate::commands::sync::format_sync_report;
use crate::error::CliError;

fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn format_sync_timestamp_returns_utc_label() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn parse_date_requires_iso_format() {
    assert_eq!(
        parse_date(" 2024-03-04 ").unwrap(),
        chrono::NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    );
    assert!(matches!(parse_date("04/03/2024"), Err(CliError::InvalidDate(_))));
    assert!(matches!(parse_date("2024-02-30"), Err(CliError::InvalidDate(_))));
}

#[test]
fn normalize_identifier_rejects_empty() {
    assert!(matches!(normalize_identifier(" \n "), Err(CliError::EmptyId)));
    assert_eq!(normalize_identifier("  abc123  ").unwrap(), "abc123");
}

#[test]
fn explicit_db_path_wins() {
    let path = PathBuf::from("/tmp/habitsync-explicit.db");
    assert_eq!(resolve_db_path(Some(path.clone())).unwrap(), path);
}

#[test]
fn sync_report_mentions_only_nonzero_extras() {
    let report = SyncReport {
        passes: 1,
        pushed: 3,
        pulled: 2,
        failed: 1,
        ..SyncReport::default()
    };
    assert_eq!(
        format_sync_report(&report),
        "Sync completed: 3 pushed, 2 pulled, 1 failed"
    );
}

#[test]
fn status_lines_show_errors_and_missing_sync() {
    let status = EngineStatus {
        online: true,
        syncing: false,
        phase: SyncPhase::Idle,
        pending_operations: 2,
        failed_operations: 1,
        last_sync_at: None,
        errors: vec!["#4 create habit: rejected".to_string()],
    };
    let item = StatusItem {
        state: status.state(),
        remote_configured: true,
        status,
    };
    assert_eq!(item.state, SyncState::Error);

    let lines = format_status_lines(&item, 0);
    assert!(lines[0].ends_with("error"));
    assert!(lines.iter().any(|line| line.ends_with("never")));
    assert_eq!(lines.last().unwrap(), "  - #4 create habit: rejected");
}

#[test]
fn format_sync_conflict_lines_include_key_fields() {
    let local_id: LocalId = "11111111-1111-7111-8111-111111111111".parse().unwrap();
    let conflicts = vec![SyncConflict {
        id: 1,
        resource_type: ResourceKind::Habit,
        local_id,
        local_updated_at: 200,
        remote_updated_at: 100,
        winner: Resolution::Local,
        resolved_at: 300,
    }];

    let rendered = format_sync_conflict_lines(&conflicts);
    assert_eq!(rendered.len(), 1);
    assert!(rendered[0].contains("kept=local"));
    assert!(rendered[0].contains("habit=11111111-1111-7111-8111-111111111111"));
    assert!(rendered[0].contains("local=200"));
    assert!(rendered[0].contains("remote=100"));
}

#[tokio::test(flavor = "multi_thread")]
async fn habit_commands_update_the_local_store() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("habitsync.db");

    run_habit_add(&words("Morning run"), None, FrequencyArg::Daily, &db_path)
        .await
        .unwrap();
    let items = list_habit_items(false, &db_path).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Morning run");

    let prefix = items[0].id.chars().take(13).collect::<String>();
    run_habit_complete(&prefix, Some("2024-03-04"), None, &db_path)
        .await
        .unwrap();
    run_habit_complete(&items[0].id, Some("2024-03-05"), None, &db_path)
        .await
        .unwrap();

    let items = list_habit_items(false, &db_path).await.unwrap();
    assert_eq!(items[0].current_streak, 2);

    let store = open_store(&db_path).await.unwrap();
    // create, then (update habit + create completion) twice
    assert_eq!(store.count_pending_operations().await.unwrap(), 5);
    store.close().await;

    run_habit_delete(&items[0].id, &db_path).await.unwrap();
    assert!(list_habit_items(true, &db_path).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_habit_name_is_rejected() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("habitsync.db");

    let result = run_habit_add(&words("   "), None, FrequencyArg::Weekly, &db_path).await;
    assert!(matches!(result, Err(CliError::EmptyName)));
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_entity_reports_missing_and_ambiguous_ids() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("habitsync.db");
    run_habit_add(&words("Read"), None, FrequencyArg::Daily, &db_path)
        .await
        .unwrap();
    run_habit_add(&words("Write"), None, FrequencyArg::Daily, &db_path)
        .await
        .unwrap();

    let store = open_store(&db_path).await.unwrap();
    let habits = store.list(ResourceKind::Habit).await.unwrap();
    let shared_prefix = habits[0].local_id.to_string().chars().take(4).collect::<String>();

    assert!(matches!(
        resolve_entity(&store, ResourceKind::Habit, &shared_prefix).await,
        Err(CliError::AmbiguousId(_))
    ));
    assert!(matches!(
        resolve_entity(&store, ResourceKind::Habit, "zzzz").await,
        Err(CliError::NotFound("habit", _))
    ));
    assert!(matches!(
        resolve_entity(&store, ResourceKind::Challenge, &habits[0].local_id.to_string()).await,
        Err(CliError::NotFound(..))
    ));

    let found = resolve_entity(&store, ResourceKind::Habit, &habits[1].local_id.to_string())
        .await
        .unwrap();
    assert_eq!(found.local_id, habits[1].local_id);
}

#[tokio::test(flavor = "multi_thread")]
async fn challenge_dates_are_validated() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("habitsync.db");

    let result = run_challenge_add("Plank month", "2024-03-31", "2024-03-01", &db_path).await;
    assert!(matches!(result, Err(CliError::Core(_))));

    run_challenge_add("Plank month", "2024-03-01", "2024-03-31", &db_path)
        .await
        .unwrap();
    let store = open_store(&db_path).await.unwrap();
    let challenge = store.list(ResourceKind::Challenge).await.unwrap().remove(0);
    store.close().await;

    let id = challenge.local_id.to_string();
    run_challenge_join(&id, "user-1", &db_path).await.unwrap();
    run_challenge_join(&id, "user-1", &db_path).await.unwrap();

    let store = open_store(&db_path).await.unwrap();
    // create plus one join; the repeated join changes nothing
    assert_eq!(store.count_pending_operations().await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_commands_reject_unknown_operations() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("habitsync.db");
    run_habit_add(&words("Stretch"), None, FrequencyArg::Daily, &db_path)
        .await
        .unwrap();

    let store = open_store(&db_path).await.unwrap();
    let operation_id = store.list_pending_operations().await.unwrap()[0].id;
    store.close().await;

    assert!(matches!(
        run_queue_retry(Some(operation_id), &db_path).await,
        Err(CliError::NotFailed(id)) if id == operation_id
    ));
    assert!(matches!(
        run_queue_discard(operation_id + 100, &db_path).await,
        Err(CliError::OperationNotFound(_))
    ));

    run_queue_discard(operation_id, &db_path).await.unwrap();
    run_queue_retry(None, &db_path).await.unwrap();
    let store = open_store(&db_path).await.unwrap();
    assert_eq!(store.count_pending_operations().await.unwrap(), 0);
}
