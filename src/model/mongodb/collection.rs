use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{
    candidate::Candidate,
    election::Election,
    roster::{Group, Person},
    vote::{Choice, EnabledVoter, Participation, Vote},
};

use super::counter::Counter;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Roster collections
impl MongoCollection for Group {
    const NAME: &'static str = "groups";
}
impl MongoCollection for Person {
    const NAME: &'static str = "persons";
}

// Election collections
impl MongoCollection for Election {
    const NAME: &'static str = "elections";
}
impl MongoCollection for Candidate {
    const NAME: &'static str = "candidates";
}
impl MongoCollection for EnabledVoter {
    const NAME: &'static str = "enabled_voters";
}

// Vote collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for Participation {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for Choice {
    const NAME: &'static str = VOTES;
}

// Counter collection
impl MongoCollection for Counter {
    const NAME: &'static str = "counters";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Roster collections.
    let group_index = IndexModel::builder()
        .keys(doc! {"number": 1})
        .options(unique.clone())
        .build();
    Coll::<Group>::from_db(db)
        .create_index(group_index, None)
        .await?;
    let person_index = IndexModel::builder()
        .keys(doc! {"document_number": 1})
        .options(unique.clone())
        .build();
    Coll::<Person>::from_db(db)
        .create_index(person_index, None)
        .await?;

    // Candidate collection: list numbers are unique per election.
    let candidate_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "list_number": 1})
        .options(unique.clone())
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    // Vote collection: one vote per person per sibling set. This is what makes
    // double voting impossible, including under concurrent casts.
    let vote_index = IndexModel::builder()
        .keys(doc! {"sibling_key": 1, "person_id": 1})
        .options(unique.clone())
        .build();
    Coll::<Vote>::from_db(db)
        .create_index(vote_index, None)
        .await?;
    let tally_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "candidate_id": 1})
        .build();
    Coll::<Vote>::from_db(db)
        .create_index(tally_index, None)
        .await?;

    // Enabled voter collection.
    let enabled_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "person_id": 1})
        .options(unique)
        .build();
    Coll::<EnabledVoter>::from_db(db)
        .create_index(enabled_index, None)
        .await?;

    Ok(())
}
