//! The persistence seam.
//!
//! The voting core only talks to storage through [`Storage`]. Production uses
//! [`MongoStore`]; tests and local development use [`MemoryStore`]. Either can be loaded
//! with a roster file by [`load_roster_file`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{
    common::election::{CandidateId, ElectionId, ElectionState, GroupId, PersonId},
    db::{
        candidate::{Candidate, NewCandidate},
        election::Election,
        roster::{Group, NewGroup, NewPerson, Person},
        vote::{Participation, Vote},
    },
    api::election::ElectionSpec,
};

mod memory;
mod mongo;
mod seed;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use seed::{load_roster_file, seed_roster, RosterError};

/// Shared handle to the store, kept in Rocket's managed state.
pub type Db = Arc<dyn Storage>;

#[rocket::async_trait]
pub trait Storage: Send + Sync {
    // Roster. Groups and people are owned by an external system and only looked up by the
    // voting core; inserts come from roster imports.
    async fn group_by_number(&self, number: &str) -> Result<Option<Group>>;
    async fn person_by_document(&self, document: &str) -> Result<Option<Person>>;
    async fn person(&self, id: PersonId) -> Result<Option<Person>>;
    async fn persons_in_group(&self, group: GroupId) -> Result<Vec<Person>>;
    async fn insert_group(&self, group: NewGroup) -> Result<Group>;
    async fn insert_person(&self, person: NewPerson) -> Result<Person>;

    // Elections.
    async fn election(&self, id: ElectionId) -> Result<Option<Election>>;
    async fn elections(&self) -> Result<Vec<Election>>;
    /// Allocate an ID and insert a new election built from a validated spec.
    async fn insert_election(&self, spec: ElectionSpec) -> Result<Election>;
    /// Atomically move an election from `from` to `to`.
    /// Returns false if the election does not exist or is no longer in state `from`.
    async fn set_state(&self, id: ElectionId, from: ElectionState, to: ElectionState)
        -> Result<bool>;
    /// Atomically delete a cancelled election with all its candidates, votes and enabled
    /// voters. Returns false, deleting nothing, if the election is missing or not cancelled.
    async fn delete_cancelled_election(&self, id: ElectionId) -> Result<bool>;
    /// Enable the given people to vote in an election, ignoring those already enabled.
    /// Returns the election with its updated enabled-voter count.
    async fn enable_voters(&self, id: ElectionId, persons: &[PersonId]) -> Result<Election>;

    // Candidates.
    async fn candidate(&self, id: CandidateId) -> Result<Option<Candidate>>;
    async fn candidates(&self, election: ElectionId) -> Result<Vec<Candidate>>;
    /// Fails with `DuplicateListNumber` if the list number is taken in that election.
    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate>;
    /// Fails with `DuplicateListNumber` if the list number is taken in that election.
    async fn replace_candidate(&self, candidate: &Candidate) -> Result<()>;
    async fn delete_candidate(&self, id: CandidateId) -> Result<bool>;

    // Votes.
    /// Find the vote, if any, that `person` has cast in the sibling set `sibling_key`.
    async fn participation(
        &self,
        sibling_key: &str,
        person: PersonId,
    ) -> Result<Option<Participation>>;
    /// Store a vote. This is the only way a vote is written, and it is atomic: the election
    /// must still be active, no vote may exist for `(vote.sibling_key, vote.person_id)`, and
    /// the election's vote counter is incremented, all or nothing.
    ///
    /// Fails with `ElectionNotFound`, `ElectionNotActive`, `AlreadyVoted` or
    /// `CrossSlotConflict`; storage contention surfaces as a transient [`crate::error::Error`].
    async fn record_vote(&self, vote: &Vote) -> Result<Election>;
    /// Vote totals by candidate, with blank votes under `None`.
    async fn tally(&self, election: ElectionId) -> Result<HashMap<Option<CandidateId>, u64>>;
}
