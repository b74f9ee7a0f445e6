use serde::{Deserialize, Serialize};

use crate::model::common::election::{CandidateId, ElectionId, ElectionState};

/// Final vote totals for an election. Contains no information about who voted for whom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResults {
    pub election_id: ElectionId,
    pub title: String,
    pub state: ElectionState,
    pub enabled_voters: u32,
    pub votes_cast: u32,
    pub blank_votes: u64,
    /// Candidates in list number order.
    pub candidates: Vec<CandidateTotal>,
    /// Fraction of enabled voters that voted, if any voters were enabled.
    pub turnout: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTotal {
    pub candidate_id: CandidateId,
    pub list_number: u32,
    pub name: String,
    pub votes: u64,
}
