use chrono::{DateTime, SecondsFormat, Utc};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::model::common::election::{CandidateId, ElectionId};

pub type HmacSha256 = Hmac<Sha256>;

/// Length of the random nonce mixed into every verification hash.
pub const NONCE_LEN: usize = 16;

/// What a verification hash is computed from. Deliberately has no room for the voter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashInput {
    pub election_id: ElectionId,
    /// `None` for a blank vote.
    pub candidate_id: Option<CandidateId>,
    pub timestamp: DateTime<Utc>,
    pub nonce: [u8; NONCE_LEN],
}

impl HashInput {
    /// Build an input with a fresh random nonce.
    pub fn new(
        election_id: ElectionId,
        candidate_id: Option<CandidateId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            election_id,
            candidate_id,
            timestamp,
            nonce: rand::random(),
        }
    }
}

/// Produces the verification hash handed back to a voter as proof that their vote was
/// stored. Must be deterministic in its input.
pub trait VerificationHasher: Send + Sync {
    fn hash(&self, input: &HashInput) -> String;
}

/// HMAC-SHA256 keyed by a server secret, rendered as lowercase hex.
pub struct HmacHasher {
    secret: Vec<u8>,
}

impl HmacHasher {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }
}

impl VerificationHasher for HmacHasher {
    fn hash(&self, input: &HashInput) -> String {
        let mut hmac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        let candidate = input
            .candidate_id
            .map_or_else(|| "blank".to_string(), |id| id.to_string());
        let timestamp = input.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        hmac.update(format!("{}|{candidate}|{timestamp}|", input.election_id).as_bytes());
        hmac.update(&input.nonce);
        HEXLOWER.encode(&hmac.finalize().into_bytes())
    }
}
