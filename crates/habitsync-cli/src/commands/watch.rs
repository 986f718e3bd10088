use std::path::Path;
use std::time::Duration;

use habitsync_core::SyncEngineConfig;

use crate::commands::common::{open_engine, open_store};
use crate::error::CliError;

/// Run the engine's background sync until Ctrl-C.
pub async fn run_watch(interval_secs: u64, db_path: &Path) -> Result<(), CliError> {
    let config =
        SyncEngineConfig::default().with_sync_interval(Duration::from_secs(interval_secs.max(1)));

    let store = open_store(db_path).await?;
    let engine = open_engine(store.clone(), true, config)?;
    engine.start();
    println!(
        "Syncing every {}s; press Ctrl-C to stop",
        interval_secs.max(1)
    );

    let interrupted = tokio::signal::ctrl_c().await;
    engine.stop();
    store.close().await;
    interrupted?;

    println!("Stopped");
    Ok(())
}
