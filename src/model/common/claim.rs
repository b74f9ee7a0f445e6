use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::common::election::PersonId;

/// How the voter was identified at the station.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentificationMethod {
    /// A structured credential payload, typically read from a QR code.
    ScannedCredential,
    /// A document number typed in by the station operator.
    ManualEntry,
    /// A group number and document number validated together.
    GroupDocumentPair,
    /// A raw, unstructured scan treated as a bare document number.
    DirectInput,
}

impl Display for IdentificationMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ScannedCredential => "scanned-credential",
            Self::ManualEntry => "manual-entry",
            Self::GroupDocumentPair => "group-document-pair",
            Self::DirectInput => "direct-input",
        };
        f.write_str(name)
    }
}

/// Raw voter input as it arrives from the station, before any normalisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawIdentification {
    #[serde(rename_all = "camelCase")]
    GroupDocument {
        group_number: String,
        document_number: String,
    },
    Credential {
        credential: String,
    },
    Document {
        document: String,
    },
}

/// A normalised, not yet trusted, statement of who is trying to vote.
///
/// This is also the payload of the vote token, so the field names are part of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterClaim {
    pub document_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_number: Option<String>,
    pub method: IdentificationMethod,
    /// Filled in once the eligibility validator has resolved the person. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_id: Option<PersonId>,
    pub timestamp: DateTime<Utc>,
    /// Descriptive fields for display at the station. Never authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
}

impl VoterClaim {
    pub fn new(
        document_number: impl Into<String>,
        group_number: Option<String>,
        method: IdentificationMethod,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            document_number: document_number.into(),
            group_number,
            method,
            person_id: None,
            timestamp,
            display_name: None,
            program: None,
        }
    }
}
