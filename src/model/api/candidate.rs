use serde::{Deserialize, Serialize};

use crate::model::{
    common::{
        candidate::CandidateState,
        election::{CandidateId, ElectionId, PersonId},
    },
    db::{candidate::Candidate, roster::Person},
};

/// A candidacy as submitted by an administrator. The person is named by document number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSpec {
    pub list_number: u32,
    pub document_number: String,
}

/// A candidate, with the candidate's name for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDescription {
    pub id: CandidateId,
    pub election_id: ElectionId,
    pub list_number: u32,
    pub person_id: PersonId,
    pub name: String,
    pub state: CandidateState,
}

impl CandidateDescription {
    pub fn new(candidate: Candidate, person: Option<&Person>) -> Self {
        Self {
            id: candidate.id,
            election_id: candidate.election_id,
            list_number: candidate.list_number,
            person_id: candidate.person_id,
            name: person.map(|p| p.name.clone()).unwrap_or_default(),
            state: candidate.state,
        }
    }
}
