use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, DurationRound, Utc};
use log::{debug, info, warn};
use rand::Rng;
use rocket::tokio::time;

use crate::error::{Error, Result, VoteError};
use crate::model::{
    api::vote::{CastReceipt, CastRequest},
    common::candidate::CandidateState,
    db::{election::Election, vote::Vote},
    station::StationContext,
    store::Db,
};

use super::{
    eligibility,
    hasher::{HashInput, VerificationHasher},
    publisher::{publish_detached, Publisher, VoteCast},
    token,
};

const BACKOFF_BASE_MS: u64 = 5;
const BACKOFF_MAX_DOUBLINGS: u32 = 6;

/// Turns a cast request into a stored vote.
pub struct VoteCaster {
    db: Db,
    hasher: Arc<dyn VerificationHasher>,
    publisher: Publisher,
    attempts: u32,
}

impl VoteCaster {
    /// `attempts` bounds how many times a vote is written when storage reports
    /// transient contention; it is always at least one.
    pub fn new(
        db: Db,
        hasher: Arc<dyn VerificationHasher>,
        publisher: Publisher,
        attempts: u32,
    ) -> Self {
        Self {
            db,
            hasher,
            publisher,
            attempts: attempts.max(1),
        }
    }

    /// Cast a vote, returning the voter's receipt.
    pub async fn cast(&self, request: CastRequest, station: &StationContext) -> Result<CastReceipt> {
        let election_id = request.election_id;
        let result = self.try_cast(request, station).await;
        if let Err(ref e) = result {
            match e.as_vote_error() {
                Some(reason) => warn!(
                    "req{} station {}: vote refused in election {election_id}: {reason}",
                    station.request_id, station.station
                ),
                None => warn!(
                    "req{} station {}: vote failed in election {election_id}: {e}",
                    station.request_id, station.station
                ),
            }
        }
        result
    }

    async fn try_cast(&self, request: CastRequest, station: &StationContext) -> Result<CastReceipt> {
        let db = self.db.as_ref();

        // The token only carries the claim; nothing in it is trusted.
        let claim = token::decode(&request.token)?;

        let election = eligibility::active_election(db, request.election_id).await?;

        match request.candidate_id {
            Some(id) => {
                let candidate = db
                    .candidate(id)
                    .await?
                    .ok_or(VoteError::CandidateNotFound(id))?;
                if candidate.state != CandidateState::Validated {
                    return Err(VoteError::CandidateNotValidated(id, candidate.state).into());
                }
                if candidate.election_id != election.id {
                    return Err(VoteError::CandidateElectionMismatch {
                        candidate: id,
                        election: election.id,
                    }
                    .into());
                }
            }
            None if !election.allows_blank_vote => {
                return Err(VoteError::BlankVoteNotAllowed(election.id).into());
            }
            None => {}
        }

        // Group membership is re-checked here. Prior votes are not: the insert below
        // rejects them atomically.
        let (person, _) = eligibility::identify_person(db, &claim).await?;

        let cast_at = Utc::now();
        let cast_at = cast_at
            .duration_trunc(Duration::milliseconds(1))
            .unwrap_or(cast_at);
        let verification_hash = self
            .hasher
            .hash(&HashInput::new(election.id, request.candidate_id, cast_at));
        let vote = Vote {
            election_id: election.id,
            candidate_id: request.candidate_id,
            person_id: person.id,
            sibling_key: election.sibling_key.clone(),
            slot: election.slot.clone(),
            cast_at,
            verification_hash: verification_hash.clone(),
        };
        let election = self.record(&vote, station).await?;
        info!(
            "req{} station {}: vote recorded in election {}",
            station.request_id, station.station, election.id
        );

        publish_detached(
            self.publisher.clone(),
            VoteCast {
                election_id: election.id,
                votes_cast: election.votes_cast,
                timestamp: cast_at,
            },
        );

        Ok(CastReceipt {
            verification_hash,
            timestamp: cast_at,
        })
    }

    /// Write the vote, retrying on transient storage contention.
    ///
    /// A retry can find the vote already stored if an earlier attempt committed but
    /// reported failure. That vote carries this attempt's verification hash, and is taken
    /// as success rather than a prior vote.
    async fn record(&self, vote: &Vote, station: &StationContext) -> Result<Election> {
        let mut attempt = 1;
        loop {
            match self.db.record_vote(vote).await {
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    debug!(
                        "req{}: transient failure recording vote (attempt {attempt}/{}), retrying: {e}",
                        station.request_id, self.attempts
                    );
                    backoff(attempt).await;
                    attempt += 1;
                }
                Err(e) if attempt > 1 && is_vote_conflict(&e) => {
                    return match self.db.participation(&vote.sibling_key, vote.person_id).await? {
                        Some(stored) if stored.verification_hash == vote.verification_hash => {
                            info!(
                                "req{}: vote from an earlier attempt was committed",
                                station.request_id
                            );
                            Ok(self
                                .db
                                .election(vote.election_id)
                                .await?
                                .ok_or(VoteError::ElectionNotFound(vote.election_id))?)
                        }
                        _ => Err(e),
                    };
                }
                result => return result,
            }
        }
    }
}

fn is_vote_conflict(e: &Error) -> bool {
    matches!(
        e.as_vote_error(),
        Some(VoteError::AlreadyVoted(_) | VoteError::CrossSlotConflict(_))
    )
}

/// Sleep before retry number `attempt`: an exponential ceiling, jittered down to half of it.
async fn backoff(attempt: u32) {
    let ceiling = BACKOFF_BASE_MS << attempt.saturating_sub(1).min(BACKOFF_MAX_DOUBLINGS);
    let delay = rand::thread_rng().gen_range(ceiling / 2..=ceiling);
    time::sleep(StdDuration::from_millis(delay)).await;
}
