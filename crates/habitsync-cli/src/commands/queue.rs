use std::path::Path;

use crate::commands::common::{format_operation_lines, open_store, operation_to_item, OperationItem};
use crate::error::CliError;

pub async fn run_queue_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let operations = store.list_pending_operations().await?;

    if as_json {
        let json_items = operations
            .iter()
            .map(operation_to_item)
            .collect::<Vec<OperationItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if operations.is_empty() {
        println!("Queue is empty.");
    } else {
        for line in format_operation_lines(&operations) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_queue_retry(id: Option<i64>, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;

    match id {
        Some(id) => {
            if !store.retry_failed(id).await? {
                return Err(CliError::NotFailed(id));
            }
            println!("Operation #{id} requeued");
        }
        None => {
            let count = store.retry_all_failed().await?;
            println!("{count} operation(s) requeued");
        }
    }
    Ok(())
}

pub async fn run_queue_discard(id: i64, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    if !store.discard_operation(id).await? {
        return Err(CliError::OperationNotFound(id));
    }
    println!("Operation #{id} discarded");
    Ok(())
}
