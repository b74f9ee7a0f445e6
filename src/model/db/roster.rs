use serde::{Deserialize, Serialize};

use crate::model::common::election::{GroupId, PersonId};

/// A cohort of learners ("ficha"). Managed externally and treated as immutable here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "_id")]
    pub id: GroupId,
    /// The public group number, as printed on credentials.
    pub number: String,
    /// Training programme name.
    pub program: String,
    /// Time slot ("jornada") the group attends.
    pub slot: String,
    pub site: Option<String>,
    pub center: Option<String>,
}

/// A group without an ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub number: String,
    pub program: String,
    pub slot: String,
    pub site: Option<String>,
    pub center: Option<String>,
}

impl NewGroup {
    pub fn with_id(self, id: GroupId) -> Group {
        Group {
            id,
            number: self.number.trim().to_string(),
            program: self.program,
            slot: self.slot,
            site: self.site,
            center: self.center,
        }
    }
}

/// A registered person. Document numbers are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    #[serde(rename = "_id")]
    pub id: PersonId,
    pub document_type: String,
    pub document_number: String,
    pub name: String,
    /// The single group this person belongs to, if any.
    pub group_id: Option<GroupId>,
}

/// A person without an ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPerson {
    pub document_type: String,
    pub document_number: String,
    pub name: String,
    pub group_id: Option<GroupId>,
}

impl NewPerson {
    pub fn with_id(self, id: PersonId) -> Person {
        Person {
            id,
            document_type: self.document_type,
            document_number: self.document_number.trim().to_string(),
            name: self.name,
            group_id: self.group_id,
        }
    }
}

/// A roster import file: groups, then the people in them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RosterFile {
    #[serde(default)]
    pub groups: Vec<NewGroup>,
    #[serde(default)]
    pub persons: Vec<RosterPerson>,
}

/// A person in a [`RosterFile`], naming their group by number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RosterPerson {
    #[serde(default = "default_document_type")]
    pub document_type: String,
    pub document_number: String,
    pub name: String,
    pub group: Option<String>,
}

fn default_document_type() -> String {
    "CC".to_string()
}

impl RosterPerson {
    pub fn into_new_person(self, group_id: Option<GroupId>) -> NewPerson {
        NewPerson {
            document_type: self.document_type,
            document_number: self.document_number,
            name: self.name,
            group_id,
        }
    }
}
