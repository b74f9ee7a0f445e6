use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::common::{
    claim::VoterClaim,
    election::{CandidateId, ElectionId},
};

/// A request to cast a vote. A null candidate is a blank vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastRequest {
    pub election_id: ElectionId,
    #[serde(default)]
    pub candidate_id: Option<CandidateId>,
    pub token: String,
}

/// Proof of a successfully cast vote, returned to the voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastReceipt {
    pub verification_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// The outcome of a successful identification pre-check: the token to vote with, and the
/// claim it carries for display at the station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub token: String,
    pub claim: VoterClaim,
}
