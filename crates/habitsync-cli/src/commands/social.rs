use std::path::Path;

use habitsync_core::models::Challenge;
use habitsync_core::ResourceKind;

use crate::commands::common::{normalize_identifier, open_store, parse_date, resolve_entity};
use crate::error::CliError;

pub async fn run_challenge_add(
    title: &str,
    start: &str,
    end: &str,
    db_path: &Path,
) -> Result<(), CliError> {
    let challenge = Challenge::new(title.trim(), parse_date(start)?, parse_date(end)?)?;

    let store = open_store(db_path).await?;
    let entity = store.create_challenge(challenge).await?;
    println!("{}", entity.local_id);
    Ok(())
}

pub async fn run_challenge_join(id: &str, user_id: &str, db_path: &Path) -> Result<(), CliError> {
    let user_id = normalize_identifier(user_id)?;

    let store = open_store(db_path).await?;
    let challenge = resolve_entity(&store, ResourceKind::Challenge, id).await?;
    let updated = store.join_challenge(&challenge.local_id, &user_id).await?;

    if updated.version == challenge.version {
        println!("{user_id} already participates");
    } else {
        println!("{user_id} joined {}", challenge.local_id);
    }
    Ok(())
}

pub async fn run_friend_add(
    user_id: &str,
    display_name_parts: &[String],
    db_path: &Path,
) -> Result<(), CliError> {
    let user_id = normalize_identifier(user_id)?;
    let display_name = display_name_parts.join(" ");
    let display_name = match display_name.trim() {
        "" => user_id.clone(),
        name => name.to_string(),
    };

    let store = open_store(db_path).await?;
    let entity = store.add_friend(&user_id, &display_name).await?;
    println!("{}", entity.local_id);
    Ok(())
}
