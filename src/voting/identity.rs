//! Identity resolution: turning whatever the station read or typed into a [`VoterClaim`].
//!
//! This step is pure normalisation. Nothing here touches storage, and nothing here makes
//! the claim trustworthy; that is the job of [`super::eligibility`].

use log::debug;
use rocket::serde::json::serde_json::{self, Map, Value};

use crate::error::VoteError;
use crate::model::{
    common::claim::{IdentificationMethod, RawIdentification, VoterClaim},
    station::StationContext,
};

/// Keys a credential payload may carry the document number under.
const DOCUMENT_KEYS: [&str; 6] = [
    "documentNumber",
    "document_number",
    "documento",
    "numeroDocumento",
    "numero_documento",
    "document",
];
/// Keys a credential payload may carry the group number under.
const GROUP_KEYS: [&str; 5] = [
    "groupNumber",
    "group_number",
    "ficha",
    "numeroFicha",
    "numero_ficha",
];
const NAME_KEYS: [&str; 4] = ["name", "displayName", "nombre", "nombreCompleto"];
const PROGRAM_KEYS: [&str; 2] = ["program", "programa"];

/// Normalise raw station input into a claim, stamped with the time the station's request
/// was received.
pub fn resolve(raw: RawIdentification, station: &StationContext) -> Result<VoterClaim, VoteError> {
    let claim = match raw {
        RawIdentification::GroupDocument {
            group_number,
            document_number,
        } => {
            let group = non_empty(&group_number).ok_or(VoteError::MalformedClaim)?;
            let document = non_empty(&document_number).ok_or(VoteError::MalformedClaim)?;
            VoterClaim::new(
                document,
                Some(group),
                IdentificationMethod::GroupDocumentPair,
                station.received_at,
            )
        }
        RawIdentification::Document { document } => {
            let document = non_empty(&document).ok_or(VoteError::MalformedClaim)?;
            VoterClaim::new(
                document,
                None,
                IdentificationMethod::ManualEntry,
                station.received_at,
            )
        }
        RawIdentification::Credential { credential } => resolve_credential(&credential, station)?,
    };
    debug!(
        "req{} station {}: resolved {} claim",
        station.request_id, station.station, claim.method
    );
    Ok(claim)
}

/// A credential is either a structured (JSON object) payload or a bare document number.
/// Other JSON values are refused.
fn resolve_credential(
    credential: &str,
    station: &StationContext,
) -> Result<VoterClaim, VoteError> {
    let credential = credential.trim();
    if credential.is_empty() {
        return Err(VoteError::MalformedClaim);
    }
    match serde_json::from_str::<Value>(credential) {
        Ok(Value::Object(payload)) => {
            let document = first_field(&payload, &DOCUMENT_KEYS).ok_or(VoteError::MalformedClaim)?;
            let mut claim = VoterClaim::new(
                document,
                first_field(&payload, &GROUP_KEYS),
                IdentificationMethod::ScannedCredential,
                station.received_at,
            );
            claim.display_name = first_field(&payload, &NAME_KEYS);
            claim.program = first_field(&payload, &PROGRAM_KEYS);
            Ok(claim)
        }
        // A JSON-quoted document number.
        Ok(Value::String(document)) => {
            let document = non_empty(&document).ok_or(VoteError::MalformedClaim)?;
            Ok(VoterClaim::new(
                document,
                None,
                IdentificationMethod::DirectInput,
                station.received_at,
            ))
        }
        // Structured, but nothing a document number could be read from.
        Ok(Value::Null | Value::Bool(_) | Value::Array(_)) => Err(VoteError::MalformedClaim),
        // Numbers and plain text are taken verbatim, so "00123" keeps its leading zeros.
        Ok(Value::Number(_)) | Err(_) => Ok(VoterClaim::new(
            credential,
            None,
            IdentificationMethod::DirectInput,
            station.received_at,
        )),
    }
}

fn first_field(payload: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(|value| match value {
            Value::String(s) => non_empty(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
