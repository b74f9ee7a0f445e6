use std::fmt::{Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// Review state of a candidacy. Only validated candidates may receive votes.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateState {
    #[default]
    Pending,
    Validated,
    Rejected,
}

impl Display for CandidateState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

impl From<CandidateState> for Bson {
    fn from(state: CandidateState) -> Self {
        to_bson(&state).expect("Serialisation is infallible")
    }
}
