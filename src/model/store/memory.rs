use std::collections::{BTreeMap, HashMap, HashSet};

use rocket::{http::Status, tokio::sync::Mutex};

use crate::error::{Error, Result, VoteError};
use crate::model::{
    api::election::ElectionSpec,
    common::election::{CandidateId, ElectionId, ElectionState, GroupId, PersonId},
    db::{
        candidate::{Candidate, NewCandidate},
        election::Election,
        roster::{Group, NewGroup, NewPerson, Person},
        vote::{Participation, Vote},
    },
};

use super::Storage;

/// A store that keeps everything in process memory behind a single lock.
/// Every operation holds the lock for its whole duration, so each is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    groups: BTreeMap<GroupId, Group>,
    persons: BTreeMap<PersonId, Person>,
    elections: BTreeMap<ElectionId, Election>,
    candidates: BTreeMap<CandidateId, Candidate>,
    votes: Vec<Vote>,
    /// Unique index over `(sibling_key, person_id)`, pointing into `votes`.
    vote_keys: HashMap<(String, PersonId), usize>,
    enabled: HashSet<(ElectionId, PersonId)>,
    next_group: GroupId,
    next_person: PersonId,
    next_election: ElectionId,
    next_candidate: CandidateId,
}

/// Allocate the next ID from a counter; IDs start at 1.
fn next_id(counter: &mut u32) -> u32 {
    *counter += 1;
    *counter
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn list_number_taken(&self, candidate: CandidateId, election: ElectionId, list: u32) -> bool {
        self.candidates.values().any(|c| {
            c.id != candidate && c.election_id == election && c.list_number == list
        })
    }
}

#[rocket::async_trait]
impl Storage for MemoryStore {
    async fn group_by_number(&self, number: &str) -> Result<Option<Group>> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.values().find(|g| g.number == number).cloned())
    }

    async fn person_by_document(&self, document: &str) -> Result<Option<Person>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .persons
            .values()
            .find(|p| p.document_number == document)
            .cloned())
    }

    async fn person(&self, id: PersonId) -> Result<Option<Person>> {
        Ok(self.tables.lock().await.persons.get(&id).cloned())
    }

    async fn persons_in_group(&self, group: GroupId) -> Result<Vec<Person>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .persons
            .values()
            .filter(|p| p.group_id == Some(group))
            .cloned()
            .collect())
    }

    async fn insert_group(&self, group: NewGroup) -> Result<Group> {
        let mut tables = self.tables.lock().await;
        let number = group.number.trim();
        if tables.groups.values().any(|g| g.number == number) {
            return Err(Error::Status(
                Status::Conflict,
                format!("Group number {number} already exists"),
            ));
        }
        let id = next_id(&mut tables.next_group);
        let group = group.with_id(id);
        tables.groups.insert(id, group.clone());
        Ok(group)
    }

    async fn insert_person(&self, person: NewPerson) -> Result<Person> {
        let mut tables = self.tables.lock().await;
        let document = person.document_number.trim();
        if tables.persons.values().any(|p| p.document_number == document) {
            return Err(Error::Status(
                Status::Conflict,
                format!("Document {document} is already registered"),
            ));
        }
        let id = next_id(&mut tables.next_person);
        let person = person.with_id(id);
        tables.persons.insert(id, person.clone());
        Ok(person)
    }

    async fn election(&self, id: ElectionId) -> Result<Option<Election>> {
        Ok(self.tables.lock().await.elections.get(&id).cloned())
    }

    async fn elections(&self) -> Result<Vec<Election>> {
        Ok(self.tables.lock().await.elections.values().cloned().collect())
    }

    async fn insert_election(&self, spec: ElectionSpec) -> Result<Election> {
        let mut tables = self.tables.lock().await;
        let id = next_id(&mut tables.next_election);
        let election = Election::new(id, spec);
        tables.elections.insert(id, election.clone());
        Ok(election)
    }

    async fn set_state(
        &self,
        id: ElectionId,
        from: ElectionState,
        to: ElectionState,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.elections.get_mut(&id) {
            Some(election) if election.state == from => {
                election.state = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_cancelled_election(&self, id: ElectionId) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.elections.get(&id) {
            Some(election) if election.state == ElectionState::Cancelada => {}
            _ => return Ok(false),
        }
        tables.elections.remove(&id);
        tables.candidates.retain(|_, c| c.election_id != id);
        tables.enabled.retain(|(election, _)| *election != id);
        tables.votes.retain(|v| v.election_id != id);
        // Rebuild the unique index, since vote positions have shifted.
        let vote_keys = tables
            .votes
            .iter()
            .enumerate()
            .map(|(i, v)| ((v.sibling_key.clone(), v.person_id), i))
            .collect();
        tables.vote_keys = vote_keys;
        Ok(true)
    }

    async fn enable_voters(&self, id: ElectionId, persons: &[PersonId]) -> Result<Election> {
        let mut tables = self.tables.lock().await;
        if !tables.elections.contains_key(&id) {
            return Err(VoteError::ElectionNotFound(id).into());
        }
        for person in persons {
            tables.enabled.insert((id, *person));
        }
        let count = tables.enabled.iter().filter(|(e, _)| *e == id).count();
        let election = tables
            .elections
            .get_mut(&id)
            .ok_or(VoteError::ElectionNotFound(id))?;
        election.enabled_voters = u32::try_from(count).unwrap_or(u32::MAX);
        Ok(election.clone())
    }

    async fn candidate(&self, id: CandidateId) -> Result<Option<Candidate>> {
        Ok(self.tables.lock().await.candidates.get(&id).cloned())
    }

    async fn candidates(&self, election: ElectionId) -> Result<Vec<Candidate>> {
        let tables = self.tables.lock().await;
        let mut candidates: Vec<_> = tables
            .candidates
            .values()
            .filter(|c| c.election_id == election)
            .cloned()
            .collect();
        candidates.sort_by_key(|c| c.list_number);
        Ok(candidates)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate> {
        let mut tables = self.tables.lock().await;
        if tables.list_number_taken(0, candidate.election_id, candidate.list_number) {
            return Err(VoteError::DuplicateListNumber(candidate.list_number).into());
        }
        let id = next_id(&mut tables.next_candidate);
        let candidate = candidate.with_id(id);
        tables.candidates.insert(id, candidate.clone());
        Ok(candidate)
    }

    async fn replace_candidate(&self, candidate: &Candidate) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.list_number_taken(candidate.id, candidate.election_id, candidate.list_number) {
            return Err(VoteError::DuplicateListNumber(candidate.list_number).into());
        }
        match tables.candidates.get_mut(&candidate.id) {
            Some(existing) => {
                *existing = candidate.clone();
                Ok(())
            }
            None => Err(VoteError::CandidateNotFound(candidate.id).into()),
        }
    }

    async fn delete_candidate(&self, id: CandidateId) -> Result<bool> {
        Ok(self.tables.lock().await.candidates.remove(&id).is_some())
    }

    async fn participation(
        &self,
        sibling_key: &str,
        person: PersonId,
    ) -> Result<Option<Participation>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .vote_keys
            .get(&(sibling_key.to_string(), person))
            .map(|&i| Participation::from(&tables.votes[i])))
    }

    async fn record_vote(&self, vote: &Vote) -> Result<Election> {
        let mut tables = self.tables.lock().await;

        let election = tables
            .elections
            .get(&vote.election_id)
            .ok_or(VoteError::ElectionNotFound(vote.election_id))?;
        if !election.state.accepts_votes() {
            return Err(VoteError::ElectionNotActive(election.id, election.state).into());
        }

        let key = (vote.sibling_key.clone(), vote.person_id);
        if let Some(&existing) = tables.vote_keys.get(&key) {
            let prior = Participation::from(&tables.votes[existing]);
            return Err(prior.conflict_for(vote.election_id).into());
        }

        tables.votes.push(vote.clone());
        let position = tables.votes.len() - 1;
        tables.vote_keys.insert(key, position);
        let election = tables
            .elections
            .get_mut(&vote.election_id)
            .ok_or(VoteError::ElectionNotFound(vote.election_id))?;
        election.votes_cast += 1;
        Ok(election.clone())
    }

    async fn tally(&self, election: ElectionId) -> Result<HashMap<Option<CandidateId>, u64>> {
        let tables = self.tables.lock().await;
        let mut totals = HashMap::new();
        for vote in tables.votes.iter().filter(|v| v.election_id == election) {
            *totals.entry(vote.candidate_id).or_insert(0) += 1;
        }
        Ok(totals)
    }
}


#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn vote(election: &Election, person_id: PersonId) -> Vote {
        Vote {
            election_id: election.id,
            candidate_id: None,
            person_id,
            sibling_key: election.sibling_key.clone(),
            slot: election.slot.clone(),
            cast_at: Utc::now(),
            verification_hash: "00".to_string(),
        }
    }

    async fn active_election(store: &MemoryStore, spec: ElectionSpec) -> Election {
        let election = store.insert_election(spec).await.unwrap();
        assert!(store
            .set_state(election.id, ElectionState::Configuracion, ElectionState::Activa)
            .await
            .unwrap());
        store.election(election.id).await.unwrap().unwrap()
    }

    #[rocket::async_test]
    async fn record_vote_is_unique_per_sibling_key() {
        let store = MemoryStore::new();
        let election = active_election(&store, ElectionSpec::current_example()).await;

        let updated = store.record_vote(&vote(&election, 7)).await.unwrap();
        assert_eq!(updated.votes_cast, 1);

        let err = store.record_vote(&vote(&election, 7)).await.unwrap_err();
        assert!(matches!(err.as_vote_error(), Some(VoteError::AlreadyVoted(_))));
        let election = store.election(election.id).await.unwrap().unwrap();
        assert_eq!(election.votes_cast, 1);

        // Somebody else can still vote.
        store.record_vote(&vote(&election, 8)).await.unwrap();
        assert_eq!(store.tally(election.id).await.unwrap()[&None], 2);
    }

    #[rocket::async_test]
    async fn record_vote_requires_active_election() {
        let store = MemoryStore::new();
        let election = store
            .insert_election(ElectionSpec::current_example())
            .await
            .unwrap();
        let err = store.record_vote(&vote(&election, 1)).await.unwrap_err();
        assert_eq!(
            err.as_vote_error(),
            Some(&VoteError::ElectionNotActive(
                election.id,
                ElectionState::Configuracion
            ))
        );
        assert!(store.participation(&election.sibling_key, 1).await.unwrap().is_none());
    }

    #[rocket::async_test]
    async fn delete_cascades_only_when_cancelled() {
        let store = MemoryStore::new();
        let election = active_election(&store, ElectionSpec::current_example()).await;
        let other = active_election(&store, ElectionSpec::current_example()).await;
        store
            .insert_candidate(NewCandidate {
                election_id: election.id,
                list_number: 1,
                person_id: 3,
            })
            .await
            .unwrap();
        store.record_vote(&vote(&election, 3)).await.unwrap();
        store.record_vote(&vote(&other, 3)).await.unwrap();

        assert!(!store.delete_cancelled_election(election.id).await.unwrap());
        assert_eq!(store.candidates(election.id).await.unwrap().len(), 1);

        store
            .set_state(election.id, ElectionState::Activa, ElectionState::Cancelada)
            .await
            .unwrap();
        assert!(store.delete_cancelled_election(election.id).await.unwrap());
        assert!(store.election(election.id).await.unwrap().is_none());
        assert!(store.candidates(election.id).await.unwrap().is_empty());

        // The other election's vote survives and is still indexed.
        let prior = store
            .participation(&other.sibling_key, 3)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prior.election_id, other.id);
    }

    #[rocket::async_test]
    async fn list_numbers_are_unique_per_election() {
        let store = MemoryStore::new();
        let candidate = NewCandidate {
            election_id: 1,
            list_number: 4,
            person_id: 1,
        };
        store.insert_candidate(candidate.clone()).await.unwrap();
        let err = store.insert_candidate(candidate.clone()).await.unwrap_err();
        assert_eq!(err.as_vote_error(), Some(&VoteError::DuplicateListNumber(4)));

        // The same list number is fine in another election.
        store
            .insert_candidate(NewCandidate {
                election_id: 2,
                ..candidate
            })
            .await
            .unwrap();
    }
}
