//! The vote token: a voter claim carried from the station's pre-check to the cast call.
//!
//! A token is `<payload>.<checksum>`, where the payload is the claim as base64url JSON and
//! the checksum is the first 8 bytes of its SHA-256 in hex. The checksum only detects
//! corruption; it is not a signature, and a decoded claim is always re-validated.

use data_encoding::{BASE64URL_NOPAD, HEXLOWER};
use rocket::serde::json::serde_json;
use sha2::{Digest, Sha256};

use crate::error::VoteError;
use crate::model::common::claim::VoterClaim;

const CHECKSUM_LEN: usize = 8;

fn checksum(payload: &[u8]) -> Vec<u8> {
    Sha256::digest(payload)[..CHECKSUM_LEN].to_vec()
}

/// Encode a claim into an opaque token.
pub fn encode(claim: &VoterClaim) -> String {
    let payload = serde_json::to_vec(claim).expect("Serialisation is infallible");
    format!(
        "{}.{}",
        BASE64URL_NOPAD.encode(&payload),
        HEXLOWER.encode(&checksum(&payload))
    )
}

/// Decode a token back into the claim it carries.
///
/// Any corruption, and any token without a document number, is an `InvalidToken`.
pub fn decode(token: &str) -> Result<VoterClaim, VoteError> {
    let (payload, sum) = token
        .trim()
        .split_once('.')
        .ok_or(VoteError::InvalidToken)?;
    let payload = BASE64URL_NOPAD
        .decode(payload.as_bytes())
        .map_err(|_| VoteError::InvalidToken)?;
    let sum = HEXLOWER
        .decode(sum.as_bytes())
        .map_err(|_| VoteError::InvalidToken)?;
    if sum != checksum(&payload) {
        return Err(VoteError::InvalidToken);
    }

    let claim: VoterClaim =
        serde_json::from_slice(&payload).map_err(|_| VoteError::InvalidToken)?;
    if claim.document_number.trim().is_empty() {
        return Err(VoteError::InvalidToken);
    }
    Ok(claim)
}
