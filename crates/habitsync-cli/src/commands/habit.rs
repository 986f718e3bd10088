use std::path::Path;

use habitsync_core::models::{Habit, HabitFrequency};
use habitsync_core::util::now_millis;
use habitsync_core::ResourceKind;

use crate::cli::FrequencyArg;
use crate::commands::common::{
    format_habit_lines, habit_to_item, open_store, parse_date, resolve_entity, HabitListItem,
};
use crate::error::CliError;

impl From<FrequencyArg> for HabitFrequency {
    fn from(value: FrequencyArg) -> Self {
        match value {
            FrequencyArg::Daily => Self::Daily,
            FrequencyArg::Weekly => Self::Weekly,
        }
    }
}

pub async fn run_habit_add(
    name_parts: &[String],
    description: Option<String>,
    frequency: FrequencyArg,
    db_path: &Path,
) -> Result<(), CliError> {
    let name = name_parts.join(" ");
    if name.trim().is_empty() {
        return Err(CliError::EmptyName);
    }

    let mut habit = Habit::new(name).with_frequency(frequency.into());
    if let Some(description) = description {
        habit = habit.with_description(description);
    }

    let store = open_store(db_path).await?;
    let entity = store.create_habit(habit).await?;
    println!("{}", entity.local_id);
    Ok(())
}

pub async fn list_habit_items(
    include_archived: bool,
    db_path: &Path,
) -> Result<Vec<HabitListItem>, CliError> {
    let store = open_store(db_path).await?;
    let now = now_millis();
    Ok(store
        .list(ResourceKind::Habit)
        .await?
        .iter()
        .filter_map(|entity| habit_to_item(entity, now))
        .filter(|item| include_archived || !item.archived)
        .collect())
}

pub async fn run_habit_list(
    include_archived: bool,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let items = list_habit_items(include_archived, db_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if items.is_empty() {
        println!("No habits yet. Add one with `habitsync habit add <name>`.");
    } else {
        for line in format_habit_lines(&items) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_habit_complete(
    id: &str,
    date: Option<&str>,
    note: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let completed_on = match date {
        Some(value) => parse_date(value)?,
        None => chrono::Local::now().date_naive(),
    };

    let store = open_store(db_path).await?;
    let habit = resolve_entity(&store, ResourceKind::Habit, id).await?;
    let (updated, _) = store
        .complete_habit(&habit.local_id, completed_on, note)
        .await?;

    if let Some(habit) = updated.resource::<Habit>() {
        println!(
            "Completed {} on {completed_on} (streak {})",
            habit.name, habit.current_streak
        );
    }
    Ok(())
}

pub async fn run_habit_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let habit = resolve_entity(&store, ResourceKind::Habit, id).await?;
    store.delete(ResourceKind::Habit, &habit.local_id).await?;
    println!("{}", habit.local_id);
    Ok(())
}
