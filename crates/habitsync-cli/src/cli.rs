use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "habitsync")]
#[command(about = "Track habits offline and sync them when a connection is available")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage habits and record completions
    Habit {
        #[command(subcommand)]
        command: HabitCommands,
    },
    /// Manage challenges
    Challenge {
        #[command(subcommand)]
        command: ChallengeCommands,
    },
    /// Manage friends
    Friend {
        #[command(subcommand)]
        command: FriendCommands,
    },
    /// Push queued changes and pull remote changes
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Treat the network as unavailable (only reports what is pending)
        #[arg(long)]
        offline: bool,
    },
    /// Show connectivity, queue, and last sync state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and repair the operation queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Keep syncing in the background until interrupted
    Watch {
        /// Seconds between periodic syncs
        #[arg(long, value_name = "SECS", default_value = "60")]
        interval: u64,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum FrequencyArg {
    Daily,
    Weekly,
}

#[derive(Subcommand)]
pub enum HabitCommands {
    /// Create a habit
    #[command(alias = "new")]
    Add {
        /// Habit name
        name: Vec<String>,
        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long, value_enum, default_value_t = FrequencyArg::Daily)]
        frequency: FrequencyArg,
    },
    /// List habits
    List {
        /// Include archived habits
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a completion (today unless --date is given)
    #[command(alias = "done")]
    Complete {
        /// Habit ID or unique ID prefix
        id: String,
        /// Completion date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        date: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Delete a habit
    Delete {
        /// Habit ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ChallengeCommands {
    /// Create a challenge
    Add {
        title: String,
        /// First day (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        start: String,
        /// Last day (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        end: String,
    },
    /// Join a challenge
    Join {
        /// Challenge ID or unique ID prefix
        id: String,
        /// User joining the challenge
        #[arg(long, value_name = "USER")]
        user: String,
    },
}

#[derive(Subcommand)]
pub enum FriendCommands {
    /// Send a friend request
    Add {
        /// Remote user id
        user_id: String,
        /// Name to show for this friend
        display_name: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queued operations
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Requeue terminally failed operations
    Retry {
        /// Operation id (all failed operations when omitted)
        id: Option<i64>,
    },
    /// Drop a queued operation without pushing it
    Discard {
        /// Operation id
        id: i64,
    },
}
