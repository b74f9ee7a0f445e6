//! Responses of the voting station's advisory lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{GroupId, PersonId},
    db::roster::{Group, Person},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub id: GroupId,
    pub number: String,
    pub program: String,
    pub slot: String,
    pub site: Option<String>,
    pub center: Option<String>,
}

impl From<Group> for GroupInfo {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            number: group.number,
            program: group.program,
            slot: group.slot,
            site: group.site,
            center: group.center,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonInfo {
    pub id: PersonId,
    pub document_type: String,
    pub document_number: String,
    pub name: String,
}

impl From<Person> for PersonInfo {
    fn from(person: Person) -> Self {
        Self {
            id: person.id,
            document_type: person.document_type,
            document_number: person.document_number,
            name: person.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupLookup {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonLookup {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person: Option<PersonInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorVote {
    pub has_voted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtherSlotVote {
    pub has_voted_in_other_slot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
}
