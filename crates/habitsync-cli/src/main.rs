//! habitsync CLI - track habits from the terminal
//!
//! Every change is stored locally first and pushed by `habitsync sync` or
//! `habitsync watch`.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{
    ChallengeCommands, Cli, Commands, FriendCommands, HabitCommands, QueueCommands, SyncCommands,
};
use crate::commands::common::resolve_db_path;
use crate::commands::habit::{run_habit_add, run_habit_complete, run_habit_delete, run_habit_list};
use crate::commands::queue::{run_queue_discard, run_queue_list, run_queue_retry};
use crate::commands::social::{run_challenge_add, run_challenge_join, run_friend_add};
use crate::commands::status::run_status;
use crate::commands::sync::{run_sync, run_sync_conflicts};
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("habitsync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;

    match cli.command {
        Commands::Habit { command } => match command {
            HabitCommands::Add {
                name,
                description,
                frequency,
            } => run_habit_add(&name, description, frequency, &db_path).await?,
            HabitCommands::List { all, json } => run_habit_list(all, json, &db_path).await?,
            HabitCommands::Complete { id, date, note } => {
                run_habit_complete(&id, date.as_deref(), note, &db_path).await?;
            }
            HabitCommands::Delete { id } => run_habit_delete(&id, &db_path).await?,
        },
        Commands::Challenge { command } => match command {
            ChallengeCommands::Add { title, start, end } => {
                run_challenge_add(&title, &start, &end, &db_path).await?;
            }
            ChallengeCommands::Join { id, user } => {
                run_challenge_join(&id, &user, &db_path).await?;
            }
        },
        Commands::Friend { command } => match command {
            FriendCommands::Add {
                user_id,
                display_name,
            } => run_friend_add(&user_id, &display_name, &db_path).await?,
        },
        Commands::Sync { command, offline } => match command {
            Some(SyncCommands::Conflicts { limit, json }) => {
                run_sync_conflicts(limit, json, &db_path).await?;
            }
            None => run_sync(offline, &db_path).await?,
        },
        Commands::Status { json } => run_status(json, &db_path).await?,
        Commands::Queue { command } => match command {
            QueueCommands::List { json } => run_queue_list(json, &db_path).await?,
            QueueCommands::Retry { id } => run_queue_retry(id, &db_path).await?,
            QueueCommands::Discard { id } => run_queue_discard(id, &db_path).await?,
        },
        Commands::Watch { interval } => run_watch(interval, &db_path).await?,
    }

    Ok(())
}
