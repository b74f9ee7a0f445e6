use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::error::VoteError;
use crate::model::common::election::{CandidateId, ElectionId, PersonId};

/// A cast vote, as stored in the database.
///
/// The person is stored only so that `(sibling_key, person_id)` can be unique; it is never
/// read back together with `candidate_id`. Use [`Participation`] or [`Choice`] to read votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Foreign Key election ID.
    pub election_id: ElectionId,
    /// Foreign Key candidate ID, or `None` for a blank vote.
    pub candidate_id: Option<CandidateId>,
    /// Foreign Key person ID.
    pub person_id: PersonId,
    /// Copied from the election; unique together with `person_id`.
    pub sibling_key: String,
    /// Copied from the election, so a sibling conflict can name the slot already used.
    pub slot: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
    pub verification_hash: String,
}

/// A view of a vote that says who voted where and when, but not for whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    pub election_id: ElectionId,
    pub slot: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
    /// Lets a caster recognise a vote it wrote itself.
    pub verification_hash: String,
}

impl Participation {
    /// The error a new vote in `election_id` conflicts with this one as.
    pub fn conflict_for(&self, election_id: ElectionId) -> VoteError {
        if self.election_id == election_id {
            VoteError::AlreadyVoted(self.cast_at)
        } else {
            VoteError::CrossSlotConflict(
                self.slot
                    .clone()
                    .unwrap_or_else(|| format!("election {}", self.election_id)),
            )
        }
    }
}

impl From<&Vote> for Participation {
    fn from(vote: &Vote) -> Self {
        Self {
            election_id: vote.election_id,
            slot: vote.slot.clone(),
            cast_at: vote.cast_at,
            verification_hash: vote.verification_hash.clone(),
        }
    }
}

/// A view of a vote that says what was chosen, but not by whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub election_id: ElectionId,
    pub candidate_id: Option<CandidateId>,
}

/// A person enabled to vote in an election.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnabledVoter {
    pub election_id: ElectionId,
    pub person_id: PersonId,
}
