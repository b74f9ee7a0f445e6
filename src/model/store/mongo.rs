use std::collections::HashMap;

use log::{debug, info};
use mongodb::{
    bson::{doc, Document},
    error::{Error as DbError, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Client, ClientSession, Database,
};
use rocket::{futures::TryStreamExt, http::Status};

use crate::error::{Error, Result, VoteError};
use crate::model::{
    api::election::ElectionSpec,
    common::election::{CandidateId, ElectionId, ElectionState, GroupId, PersonId},
    db::{
        candidate::{Candidate, NewCandidate},
        election::Election,
        roster::{Group, NewGroup, NewPerson, Person},
        vote::{Choice, EnabledVoter, Participation, Vote},
    },
    mongodb::{
        ensure_counters_exist, ensure_indexes_exist, is_duplicate_key_error, Coll, Counter,
        MongoCollection, CANDIDATE_ID_COUNTER_ID, ELECTION_ID_COUNTER_ID, GROUP_ID_COUNTER_ID,
        PERSON_ID_COUNTER_ID,
    },
};

use super::Storage;

/// A store backed by MongoDB.
///
/// Vote uniqueness is enforced by the unique index on `(sibling_key, person_id)`, and
/// multi-document changes run in transactions, so the deployment must be a replica set.
pub struct MongoStore {
    client: Client,
    db: Database,
}

/// How many times a commit is sent while the server leaves its outcome unknown.
const COMMIT_ATTEMPTS: u32 = 3;

/// Filter on an integer `_id`.
fn id_filter(id: u32) -> Document {
    doc! {"_id": i64::from(id)}
}

/// Commit the session's transaction, resending only the commit while its outcome is unknown.
async fn commit(session: &mut ClientSession) -> std::result::Result<(), DbError> {
    let mut attempt = 1;
    loop {
        match session.commit_transaction().await {
            Err(e)
                if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                    && attempt < COMMIT_ATTEMPTS =>
            {
                debug!("Transaction commit outcome unknown (attempt {attempt}), retrying: {e}");
                attempt += 1;
            }
            result => return result,
        }
    }
}

impl MongoStore {
    /// Connect to the database and perform any setup necessary.
    pub async fn connect(uri: &str, database: &str) -> std::result::Result<Self, DbError> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(database);
        ensure_indexes_exist(&db).await?;
        ensure_counters_exist(&db).await?;
        info!("Using database {database}");
        Ok(Self { client, db })
    }

    fn coll<T: MongoCollection>(&self) -> Coll<T> {
        Coll::from_db(&self.db)
    }

    /// The transactional part of [`Storage::record_vote`].
    /// Returns `None` if the election is missing or not active.
    async fn record_vote_in(
        &self,
        vote: &Vote,
        session: &mut ClientSession,
    ) -> std::result::Result<Option<Election>, DbError> {
        let filter = doc! {
            "_id": i64::from(vote.election_id),
            "state": ElectionState::Activa,
        };
        let update = doc! {
            "$inc": { "votes_cast": 1 }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let election = self
            .coll::<Election>()
            .find_one_and_update_with_session(filter, update, options, session)
            .await?;
        let Some(election) = election else {
            return Ok(None);
        };
        self.coll::<Vote>()
            .insert_one_with_session(vote, None, session)
            .await?;
        Ok(Some(election))
    }
}

#[rocket::async_trait]
impl Storage for MongoStore {
    async fn group_by_number(&self, number: &str) -> Result<Option<Group>> {
        Ok(self
            .coll::<Group>()
            .find_one(doc! {"number": number}, None)
            .await?)
    }

    async fn person_by_document(&self, document: &str) -> Result<Option<Person>> {
        Ok(self
            .coll::<Person>()
            .find_one(doc! {"document_number": document}, None)
            .await?)
    }

    async fn person(&self, id: PersonId) -> Result<Option<Person>> {
        Ok(self.coll::<Person>().find_one(id_filter(id), None).await?)
    }

    async fn persons_in_group(&self, group: GroupId) -> Result<Vec<Person>> {
        let persons = self
            .coll::<Person>()
            .find(doc! {"group_id": i64::from(group)}, None)
            .await?
            .try_collect()
            .await?;
        Ok(persons)
    }

    async fn insert_group(&self, group: NewGroup) -> Result<Group> {
        let id = Counter::next(&self.coll(), GROUP_ID_COUNTER_ID).await?;
        let group = group.with_id(id);
        match self.coll::<Group>().insert_one(&group, None).await {
            Ok(_) => Ok(group),
            Err(e) if is_duplicate_key_error(&e) => Err(Error::Status(
                Status::Conflict,
                format!("Group number {} already exists", group.number),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_person(&self, person: NewPerson) -> Result<Person> {
        let id = Counter::next(&self.coll(), PERSON_ID_COUNTER_ID).await?;
        let person = person.with_id(id);
        match self.coll::<Person>().insert_one(&person, None).await {
            Ok(_) => Ok(person),
            Err(e) if is_duplicate_key_error(&e) => Err(Error::Status(
                Status::Conflict,
                format!("Document {} is already registered", person.document_number),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn election(&self, id: ElectionId) -> Result<Option<Election>> {
        Ok(self.coll::<Election>().find_one(id_filter(id), None).await?)
    }

    async fn elections(&self) -> Result<Vec<Election>> {
        let options = FindOptions::builder().sort(doc! {"_id": 1}).build();
        let elections = self
            .coll::<Election>()
            .find(None, options)
            .await?
            .try_collect()
            .await?;
        Ok(elections)
    }

    async fn insert_election(&self, spec: ElectionSpec) -> Result<Election> {
        let id = Counter::next(&self.coll(), ELECTION_ID_COUNTER_ID).await?;
        let election = Election::new(id, spec);
        self.coll::<Election>().insert_one(&election, None).await?;
        Ok(election)
    }

    async fn set_state(
        &self,
        id: ElectionId,
        from: ElectionState,
        to: ElectionState,
    ) -> Result<bool> {
        let filter = doc! {
            "_id": i64::from(id),
            "state": from,
        };
        let update = doc! {
            "$set": { "state": to }
        };
        let result = self
            .coll::<Election>()
            .update_one(filter, update, None)
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn delete_cancelled_election(&self, id: ElectionId) -> Result<bool> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let filter = doc! {
            "_id": i64::from(id),
            "state": ElectionState::Cancelada,
        };
        let result = self
            .coll::<Election>()
            .delete_one_with_session(filter, None, &mut session)
            .await?;
        if result.deleted_count == 0 {
            session.abort_transaction().await?;
            return Ok(false);
        }

        let owned = doc! {"election_id": i64::from(id)};
        let candidates = self
            .coll::<Candidate>()
            .delete_many_with_session(owned.clone(), None, &mut session)
            .await?;
        let votes = self
            .coll::<Vote>()
            .delete_many_with_session(owned.clone(), None, &mut session)
            .await?;
        let enabled = self
            .coll::<EnabledVoter>()
            .delete_many_with_session(owned, None, &mut session)
            .await?;

        commit(&mut session).await?;
        debug!(
            "Deleted election {id} with {} candidates, {} votes, {} enabled voters",
            candidates.deleted_count, votes.deleted_count, enabled.deleted_count
        );
        Ok(true)
    }

    async fn enable_voters(&self, id: ElectionId, persons: &[PersonId]) -> Result<Election> {
        // Bulk operation support isn't in rust-mongodb yet, so insert individually
        // and skip people who are already enabled.
        let enabled = self.coll::<EnabledVoter>();
        for &person_id in persons {
            let record = EnabledVoter {
                election_id: id,
                person_id,
            };
            match enabled.insert_one(&record, None).await {
                Ok(_) => {}
                Err(e) if is_duplicate_key_error(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let count = enabled
            .count_documents(doc! {"election_id": i64::from(id)}, None)
            .await?;
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        let update = doc! {
            "$set": { "enabled_voters": i64::from(count) }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        self.coll::<Election>()
            .find_one_and_update(id_filter(id), update, options)
            .await?
            .ok_or_else(|| VoteError::ElectionNotFound(id).into())
    }

    async fn candidate(&self, id: CandidateId) -> Result<Option<Candidate>> {
        Ok(self.coll::<Candidate>().find_one(id_filter(id), None).await?)
    }

    async fn candidates(&self, election: ElectionId) -> Result<Vec<Candidate>> {
        let options = FindOptions::builder().sort(doc! {"list_number": 1}).build();
        let candidates = self
            .coll::<Candidate>()
            .find(doc! {"election_id": i64::from(election)}, options)
            .await?
            .try_collect()
            .await?;
        Ok(candidates)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate> {
        let id = Counter::next(&self.coll(), CANDIDATE_ID_COUNTER_ID).await?;
        let candidate = candidate.with_id(id);
        match self.coll::<Candidate>().insert_one(&candidate, None).await {
            Ok(_) => Ok(candidate),
            Err(e) if is_duplicate_key_error(&e) => {
                Err(VoteError::DuplicateListNumber(candidate.list_number).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_candidate(&self, candidate: &Candidate) -> Result<()> {
        let result = self
            .coll::<Candidate>()
            .replace_one(id_filter(candidate.id), candidate, None)
            .await;
        match result {
            Ok(result) if result.matched_count == 0 => {
                Err(VoteError::CandidateNotFound(candidate.id).into())
            }
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key_error(&e) => {
                Err(VoteError::DuplicateListNumber(candidate.list_number).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_candidate(&self, id: CandidateId) -> Result<bool> {
        let result = self
            .coll::<Candidate>()
            .delete_one(id_filter(id), None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn participation(
        &self,
        sibling_key: &str,
        person: PersonId,
    ) -> Result<Option<Participation>> {
        let filter = doc! {
            "sibling_key": sibling_key,
            "person_id": i64::from(person),
        };
        Ok(self.coll::<Participation>().find_one(filter, None).await?)
    }

    async fn record_vote(&self, vote: &Vote) -> Result<Election> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        match self.record_vote_in(vote, &mut session).await {
            Ok(Some(election)) => {
                commit(&mut session).await?;
                Ok(election)
            }
            Ok(None) => {
                session.abort_transaction().await?;
                match self.election(vote.election_id).await? {
                    Some(election) => {
                        Err(VoteError::ElectionNotActive(election.id, election.state).into())
                    }
                    None => Err(VoteError::ElectionNotFound(vote.election_id).into()),
                }
            }
            Err(e) if is_duplicate_key_error(&e) => {
                session.abort_transaction().await?;
                // The conflicting vote is committed, otherwise this would have been a
                // transient write conflict instead.
                match self.participation(&vote.sibling_key, vote.person_id).await? {
                    Some(prior) => Err(prior.conflict_for(vote.election_id).into()),
                    None => Err(e.into()),
                }
            }
            // Dropping the session aborts the transaction.
            Err(e) => Err(e.into()),
        }
    }

    async fn tally(&self, election: ElectionId) -> Result<HashMap<Option<CandidateId>, u64>> {
        let mut choices = self
            .coll::<Choice>()
            .find(doc! {"election_id": i64::from(election)}, None)
            .await?;
        let mut totals = HashMap::new();
        while let Some(choice) = choices.try_next().await? {
            *totals.entry(choice.candidate_id).or_insert(0) += 1;
        }
        Ok(totals)
    }
}

/// These run against the MongoDB replica set named by `db_uri` (e.g. `ROCKET_DB_URI`), each
/// on a fresh database that is dropped afterwards. Without `db_uri` they pass vacuously.
#[cfg(test)]
mod tests {
    use std::{future::Future, panic::AssertUnwindSafe, sync::Arc};

    use chrono::Utc;
    use log::warn;
    use rocket::futures::{future::join_all, FutureExt};

    use super::*;
    use crate::logging::RequestId;
    use crate::model::{
        api::vote::CastRequest,
        common::claim::{IdentificationMethod, VoterClaim},
        station::StationContext,
        store::examples::StorageExamples,
    };
    use crate::voting::{token, HmacHasher, LogPublisher, VoteCaster};

    /// Run `test` against a fresh database, dropping it however the test ends.
    async fn with_store<F, Fut>(test: F)
    where
        F: FnOnce(Arc<MongoStore>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let Ok(uri) = rocket::Config::figment().extract_inner::<String>("db_uri") else {
            warn!("`db_uri` is not set, skipping MongoDB store test");
            return;
        };
        let name = format!("votacion_test_{:08x}", rand::random::<u32>());
        let store = Arc::new(MongoStore::connect(&uri, &name).await.unwrap());
        store.insert_example_roster().await;

        let result = AssertUnwindSafe(test(store.clone())).catch_unwind().await;
        store.db.drop(None).await.unwrap();
        if let Err(cause) = result {
            std::panic::resume_unwind(cause);
        }
    }

    fn vote(election: &Election, person_id: PersonId, hash: &str) -> Vote {
        Vote {
            election_id: election.id,
            candidate_id: None,
            person_id,
            sibling_key: election.sibling_key.clone(),
            slot: election.slot.clone(),
            cast_at: Utc::now(),
            verification_hash: hash.to_string(),
        }
    }

    fn caster(store: &Arc<MongoStore>) -> VoteCaster {
        VoteCaster::new(
            store.clone(),
            Arc::new(HmacHasher::new(b"test secret")),
            Arc::new(LogPublisher),
            8,
        )
    }

    fn cast_request(election: &Election, candidate: &Candidate, claim: &VoterClaim) -> CastRequest {
        CastRequest {
            election_id: election.id,
            candidate_id: Some(candidate.id),
            token: token::encode(claim),
        }
    }

    fn claim(document: &str, group: Option<&str>) -> VoterClaim {
        VoterClaim::new(
            document,
            group.map(str::to_string),
            if group.is_some() {
                IdentificationMethod::GroupDocumentPair
            } else {
                IdentificationMethod::ManualEntry
            },
            Utc::now(),
        )
    }

    #[rocket::async_test]
    async fn concurrent_casts_for_one_person() {
        with_store(|store| async move {
            let (election, c1, _) = store
                .active_election_with_candidates(ElectionSpec::current_example())
                .await;
            let caster = caster(&store);
            let claim = claim("123", Some("G1"));

            let results = join_all((0..10).map(|i| {
                let station = StationContext::new(format!("station-{i}"), RequestId(i));
                let request = cast_request(&election, &c1, &claim);
                let caster = &caster;
                async move { caster.cast(request, &station).await }
            }))
            .await;

            let successes = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(successes, 1);
            for result in results.iter().filter_map(|r| r.as_ref().err()) {
                assert!(matches!(result.as_vote_error(), Some(VoteError::AlreadyVoted(_))));
            }
            let election = store.election(election.id).await.unwrap().unwrap();
            assert_eq!(election.votes_cast, 1);
        })
        .await;
    }

    #[rocket::async_test]
    async fn concurrent_casts_by_different_people() {
        with_store(|store| async move {
            let (election, c1, _) = store
                .active_election_with_candidates(ElectionSpec::current_example())
                .await;
            let caster = caster(&store);
            let voters = [
                claim("123", Some("G1")),
                claim("456", Some("G1")),
                claim("999", Some("G2")),
                claim("777", None),
            ];

            let results = join_all(voters.iter().enumerate().map(|(i, claim)| {
                let station = StationContext::new(format!("station-{i}"), RequestId(i));
                let request = cast_request(&election, &c1, claim);
                let caster = &caster;
                async move { caster.cast(request, &station).await }
            }))
            .await;

            for result in &results {
                assert!(result.is_ok(), "{result:?}");
            }
            let election = store.election(election.id).await.unwrap().unwrap();
            assert_eq!(election.votes_cast, 4);
            assert_eq!(store.tally(election.id).await.unwrap()[&Some(c1.id)], 4);
        })
        .await;
    }

    #[rocket::async_test]
    async fn one_vote_per_sibling_set() {
        with_store(|store| async move {
            let (morning, ..) = store
                .active_election_with_candidates(ElectionSpec::slotted_example("mañana"))
                .await;
            let (evening, ..) = store
                .active_election_with_candidates(ElectionSpec::slotted_example("noche"))
                .await;
            assert_eq!(morning.sibling_key, evening.sibling_key);

            store.record_vote(&vote(&morning, 1, "a")).await.unwrap();
            let err = store.record_vote(&vote(&evening, 1, "b")).await.unwrap_err();
            assert_eq!(
                err.as_vote_error(),
                Some(&VoteError::CrossSlotConflict("mañana".to_string()))
            );
            let err = store.record_vote(&vote(&morning, 1, "c")).await.unwrap_err();
            assert!(matches!(err.as_vote_error(), Some(VoteError::AlreadyVoted(_))));

            let stored = store
                .participation(&morning.sibling_key, 1)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.verification_hash, "a");
            assert_eq!(store.election(evening.id).await.unwrap().unwrap().votes_cast, 0);

            // Someone else still votes in the other slot.
            store.record_vote(&vote(&evening, 2, "d")).await.unwrap();
        })
        .await;
    }

    #[rocket::async_test]
    async fn record_vote_requires_active_election() {
        with_store(|store| async move {
            let election = store
                .insert_election(ElectionSpec::current_example())
                .await
                .unwrap();
            let err = store.record_vote(&vote(&election, 1, "a")).await.unwrap_err();
            assert_eq!(
                err.as_vote_error(),
                Some(&VoteError::ElectionNotActive(
                    election.id,
                    ElectionState::Configuracion
                ))
            );
            let err = store
                .record_vote(&Vote {
                    election_id: 404,
                    ..vote(&election, 1, "a")
                })
                .await
                .unwrap_err();
            assert_eq!(err.as_vote_error(), Some(&VoteError::ElectionNotFound(404)));
            assert!(store
                .participation(&election.sibling_key, 1)
                .await
                .unwrap()
                .is_none());
        })
        .await;
    }

    #[rocket::async_test]
    async fn delete_cascades_only_when_cancelled() {
        with_store(|store| async move {
            let (election, ..) = store
                .active_election_with_candidates(ElectionSpec::current_example())
                .await;
            let (other, ..) = store
                .active_election_with_candidates(ElectionSpec::current_example())
                .await;
            store.record_vote(&vote(&election, 1, "a")).await.unwrap();
            store.record_vote(&vote(&other, 1, "b")).await.unwrap();
            store.enable_voters(election.id, &[1, 2]).await.unwrap();

            assert!(!store.delete_cancelled_election(election.id).await.unwrap());
            assert_eq!(store.candidates(election.id).await.unwrap().len(), 2);

            assert!(store
                .set_state(election.id, ElectionState::Activa, ElectionState::Cancelada)
                .await
                .unwrap());
            assert!(store.delete_cancelled_election(election.id).await.unwrap());
            assert!(store.election(election.id).await.unwrap().is_none());
            assert!(store.candidates(election.id).await.unwrap().is_empty());
            assert!(store.tally(election.id).await.unwrap().is_empty());
            assert!(store
                .participation(&election.sibling_key, 1)
                .await
                .unwrap()
                .is_none());

            let prior = store
                .participation(&other.sibling_key, 1)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(prior.election_id, other.id);
        })
        .await;
    }

    #[rocket::async_test]
    async fn ids_and_unique_keys() {
        with_store(|store| async move {
            let first = store
                .insert_election(ElectionSpec::current_example())
                .await
                .unwrap();
            let second = store
                .insert_election(ElectionSpec::current_example())
                .await
                .unwrap();
            assert_eq!(second.id, first.id + 1);

            let candidate = NewCandidate {
                election_id: first.id,
                list_number: 4,
                person_id: 1,
            };
            store.insert_candidate(candidate.clone()).await.unwrap();
            let err = store.insert_candidate(candidate.clone()).await.unwrap_err();
            assert_eq!(err.as_vote_error(), Some(&VoteError::DuplicateListNumber(4)));
            store
                .insert_candidate(NewCandidate {
                    election_id: second.id,
                    ..candidate
                })
                .await
                .unwrap();

            let enabled = store.enable_voters(first.id, &[1, 2]).await.unwrap();
            assert_eq!(enabled.enabled_voters, 2);
            let enabled = store.enable_voters(first.id, &[2, 3]).await.unwrap();
            assert_eq!(enabled.enabled_voters, 3);

            let err = store
                .insert_group(NewGroup::example("G1", "tarde"))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Status(status, _) if status == Status::Conflict));
        })
        .await;
    }
}
