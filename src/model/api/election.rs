use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VoteError;
use crate::model::{
    common::election::{ElectionId, ElectionState, ElectionType},
    db::election::Election,
};

/// An election specification, as submitted by an administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionSpec {
    pub title: String,
    pub election_type: ElectionType,
    /// Required for slotted election types, forbidden otherwise.
    #[serde(default)]
    pub slot: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub allows_blank_vote: bool,
}

impl ElectionSpec {
    /// Check the invariants a new election must satisfy.
    pub fn validate(&self) -> Result<(), VoteError> {
        if self.title.trim().is_empty() {
            return Err(VoteError::InvalidElection("title must not be empty".to_string()));
        }
        if self.start_time >= self.end_time {
            return Err(VoteError::InvalidElection(
                "start time must be before end time".to_string(),
            ));
        }
        let has_slot = self
            .slot
            .as_deref()
            .map_or(false, |slot| !slot.trim().is_empty());
        match (self.election_type.is_slotted(), has_slot) {
            (true, false) => Err(VoteError::InvalidElection(format!(
                "{} elections need a time slot",
                self.election_type
            ))),
            (false, true) => Err(VoteError::InvalidElection(format!(
                "{} elections cannot have a time slot",
                self.election_type
            ))),
            _ => Ok(()),
        }
    }
}

/// Public description of an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionDescription {
    pub id: ElectionId,
    pub title: String,
    pub election_type: ElectionType,
    pub state: ElectionState,
    pub slot: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub allows_blank_vote: bool,
    pub enabled_voters: u32,
    pub votes_cast: u32,
}

impl From<Election> for ElectionDescription {
    fn from(election: Election) -> Self {
        let id = election.id;
        let core = election.election;
        Self {
            id,
            title: core.title,
            election_type: core.election_type,
            state: core.state,
            slot: core.slot,
            start_time: core.start_time,
            end_time: core.end_time,
            allows_blank_vote: core.allows_blank_vote,
            enabled_voters: core.enabled_voters,
            votes_cast: core.votes_cast,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_present_iff_slotted_type() {
        assert!(ElectionSpec::current_example().validate().is_ok());
        assert!(ElectionSpec::slotted_example("mañana").validate().is_ok());

        let mut missing = ElectionSpec::slotted_example("mañana");
        missing.slot = Some("  ".to_string());
        assert!(matches!(
            missing.validate(),
            Err(VoteError::InvalidElection(_))
        ));

        let mut extra = ElectionSpec::current_example();
        extra.slot = Some("tarde".to_string());
        assert!(matches!(extra.validate(), Err(VoteError::InvalidElection(_))));
    }

    #[test]
    fn window_must_be_ordered() {
        let mut spec = ElectionSpec::current_example();
        spec.end_time = spec.start_time;
        assert!(matches!(spec.validate(), Err(VoteError::InvalidElection(_))));
    }
}
