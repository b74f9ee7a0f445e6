use std::path::Path;

use log::{debug, info};
use rocket::{serde::json::serde_json, tokio::fs};
use thiserror::Error;

use crate::error::{Error, Result, VoteError};
use crate::model::db::roster::RosterFile;

use super::Storage;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("could not read roster file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid roster file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] Error),
}

/// Read a JSON roster file and load it with [`seed_roster`].
pub async fn load_roster_file(
    db: &dyn Storage,
    path: impl AsRef<Path>,
) -> std::result::Result<(usize, usize), RosterError> {
    let contents = fs::read_to_string(path).await?;
    let roster: RosterFile = serde_json::from_str(&contents)?;
    Ok(seed_roster(db, roster).await?)
}

/// Load a roster into the store. Groups and people that are already registered, by group
/// number or document number, are left as they are, so the same file can be loaded on
/// every launch.
///
/// Returns how many groups and people were added.
pub async fn seed_roster(db: &dyn Storage, roster: RosterFile) -> Result<(usize, usize)> {
    let mut groups = 0;
    for group in roster.groups {
        if db.group_by_number(group.number.trim()).await?.is_some() {
            debug!("Group {} is already registered", group.number.trim());
            continue;
        }
        db.insert_group(group).await?;
        groups += 1;
    }

    let mut persons = 0;
    for person in roster.persons {
        if db
            .person_by_document(person.document_number.trim())
            .await?
            .is_some()
        {
            continue;
        }
        let group_id = match person.group.as_deref().map(str::trim) {
            Some(number) => Some(
                db.group_by_number(number)
                    .await?
                    .ok_or_else(|| VoteError::GroupNotFound(number.to_string()))?
                    .id,
            ),
            None => None,
        };
        db.insert_person(person.into_new_person(group_id)).await?;
        persons += 1;
    }

    info!("Roster loaded: {groups} new groups, {persons} new people");
    Ok((groups, persons))
}
