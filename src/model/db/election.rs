use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    api::election::ElectionSpec,
    common::election::{ElectionId, ElectionState, ElectionType},
};

/// Core election data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Election title.
    pub title: String,
    /// The office being elected.
    pub election_type: ElectionType,
    /// Lifecycle state.
    pub state: ElectionState,
    /// Voting window start.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// Voting window end. Active elections are finalized automatically at this time.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    /// Time slot, present iff the election type is slotted.
    pub slot: Option<String>,
    /// May a vote be cast without choosing a candidate?
    pub allows_blank_vote: bool,
    /// Number of people enabled to vote in this election.
    pub enabled_voters: u32,
    /// Number of votes cast so far.
    pub votes_cast: u32,
    /// Shared by every election of the same sibling set; see [`ElectionType::sibling_key`].
    pub sibling_key: String,
}

/// An election from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: ElectionId,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Election {
    /// Create a new election in `configuracion` from an already-validated spec.
    pub fn new(id: ElectionId, spec: ElectionSpec) -> Self {
        let slot = spec
            .slot
            .map(|slot| slot.trim().to_string())
            .filter(|slot| !slot.is_empty());
        let sibling_key = spec
            .election_type
            .sibling_key(id, &spec.title, slot.as_deref());
        Self {
            id,
            election: ElectionCore {
                title: spec.title.trim().to_string(),
                election_type: spec.election_type,
                state: ElectionState::Configuracion,
                start_time: spec.start_time,
                end_time: spec.end_time,
                slot,
                allows_blank_vote: spec.allows_blank_vote,
                enabled_voters: 0,
                votes_cast: 0,
                sibling_key,
            },
        }
    }
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}
