use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
    Database,
};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::Coll;

pub const ELECTION_ID_COUNTER_ID: &str = "election_id";
pub const CANDIDATE_ID_COUNTER_ID: &str = "candidate_id";
pub const GROUP_ID_COUNTER_ID: &str = "group_id";
pub const PERSON_ID_COUNTER_ID: &str = "person_id";

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u32,
}

impl Counter {
    /// Atomically retrieve the next value of the counter with the given ID.
    pub async fn next(counters: &Coll<Counter>, id: &str) -> Result<u32> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! {"_id": id}, update, options)
            .await?
            .ok_or_else(|| {
                Error::Status(
                    Status::InternalServerError,
                    format!("Failed to find counter with ID {id}"),
                )
            })?;
        Ok(counter.next)
    }
}

/// Ensure every ID counter exists, starting at 1. Existing counters are left untouched.
///
/// This operation is idempotent.
pub async fn ensure_counters_exist(db: &Database) -> std::result::Result<(), DbError> {
    let counters = Coll::<Counter>::from_db(db);
    let upsert = UpdateOptions::builder().upsert(true).build();
    for id in [
        ELECTION_ID_COUNTER_ID,
        CANDIDATE_ID_COUNTER_ID,
        GROUP_ID_COUNTER_ID,
        PERSON_ID_COUNTER_ID,
    ] {
        counters
            .update_one(
                doc! {"_id": id},
                doc! {"$setOnInsert": {"next": 1}},
                upsert.clone(),
            )
            .await?;
    }
    Ok(())
}
