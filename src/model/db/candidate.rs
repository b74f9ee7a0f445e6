use serde::{Deserialize, Serialize};

use crate::model::common::{
    candidate::CandidateState,
    election::{CandidateId, ElectionId, PersonId},
};

/// A candidacy in one election, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: CandidateId,
    /// Foreign Key election ID.
    pub election_id: ElectionId,
    /// Ballot list number, unique within the election.
    pub list_number: u32,
    /// Foreign Key person ID.
    pub person_id: PersonId,
    pub state: CandidateState,
}

/// A candidate without an ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCandidate {
    pub election_id: ElectionId,
    pub list_number: u32,
    pub person_id: PersonId,
}

impl NewCandidate {
    /// New candidacies always start out pending review.
    pub fn with_id(self, id: CandidateId) -> Candidate {
        Candidate {
            id,
            election_id: self.election_id,
            list_number: self.list_number,
            person_id: self.person_id,
            state: CandidateState::Pending,
        }
    }
}
