use chrono::{DateTime, Utc};
use log::error;
use mongodb::error::{
    Error as DbError, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT,
};
use rocket::{
    http::Status,
    response::{self, status::Custom, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::model::common::{
    candidate::CandidateState,
    election::{CandidateId, ElectionAction, ElectionId, ElectionState},
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: String) -> Self {
        Self::Status(Status::NotFound, format!("{what} not found"))
    }

    /// Is this a storage-level contention error that is safe to retry?
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Db(err) => {
                err.contains_label(TRANSIENT_TRANSACTION_ERROR)
                    || err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
            }
            _ => false,
        }
    }

    /// The domain error, if this is one.
    pub fn as_vote_error(&self) -> Option<&VoteError> {
        match self {
            Self::Vote(err) => Some(err),
            _ => None,
        }
    }
}

/// Client-visible reasons for refusing an identification, a vote, or an administrative change.
/// None of these are retried by the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("No document number could be read from the identification")]
    MalformedClaim,
    #[error("The vote token is invalid or corrupted")]
    InvalidToken,
    #[error("Group {0} does not exist")]
    GroupNotFound(String),
    #[error("{}", person_not_in_group(.document, .group.as_deref()))]
    PersonNotInGroup {
        document: String,
        group: Option<String>,
    },
    #[error("This person already voted in this election at {0}")]
    AlreadyVoted(DateTime<Utc>),
    #[error("This person already voted in the '{0}' slot of this election")]
    CrossSlotConflict(String),
    #[error("Election {0} does not exist")]
    ElectionNotFound(ElectionId),
    #[error("Election {0} is not open for voting (state: {1})")]
    ElectionNotActive(ElectionId, ElectionState),
    #[error("Election {0} is {1}; its candidates can no longer be changed")]
    ElectionLocked(ElectionId, ElectionState),
    #[error("Candidate {0} does not exist")]
    CandidateNotFound(CandidateId),
    #[error("Candidate {0} cannot receive votes (state: {1})")]
    CandidateNotValidated(CandidateId, CandidateState),
    #[error("Candidate {candidate} does not stand in election {election}")]
    CandidateElectionMismatch {
        candidate: CandidateId,
        election: ElectionId,
    },
    #[error("Election {0} does not allow blank votes")]
    BlankVoteNotAllowed(ElectionId),
    #[error("Election {0} has no validated candidates")]
    NoValidatedCandidates(ElectionId),
    #[error("Cannot {action} an election that is {from}")]
    InvalidTransition {
        from: ElectionState,
        action: ElectionAction,
    },
    #[error("List number {0} is already taken in this election")]
    DuplicateListNumber(u32),
    #[error("No person is registered with document {0}")]
    PersonNotFound(String),
    #[error("Invalid election: {0}")]
    InvalidElection(String),
}

fn person_not_in_group(document: &str, group: Option<&str>) -> String {
    match group {
        Some(group) => format!("Document {document} is not registered in group {group}"),
        None => format!("Document {document} is not registered as a voter"),
    }
}

impl VoteError {
    /// A stable machine-readable name for the error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedClaim => "MalformedClaim",
            Self::InvalidToken => "InvalidToken",
            Self::GroupNotFound(_) => "GroupNotFound",
            Self::PersonNotInGroup { .. } => "PersonNotInGroup",
            Self::AlreadyVoted(_) => "AlreadyVoted",
            Self::CrossSlotConflict(_) => "CrossSlotConflict",
            Self::ElectionNotFound(_) => "ElectionNotFound",
            Self::ElectionNotActive(..) => "ElectionNotActive",
            Self::ElectionLocked(..) => "ElectionLocked",
            Self::CandidateNotFound(_) => "CandidateNotFound",
            Self::CandidateNotValidated(..) => "CandidateNotValidated",
            Self::CandidateElectionMismatch { .. } => "CandidateElectionMismatch",
            Self::BlankVoteNotAllowed(_) => "BlankVoteNotAllowed",
            Self::NoValidatedCandidates(_) => "NoValidatedCandidates",
            Self::InvalidTransition { .. } => "InvalidTransition",
            Self::DuplicateListNumber(_) => "DuplicateListNumber",
            Self::PersonNotFound(_) => "PersonNotFound",
            Self::InvalidElection(_) => "InvalidElection",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::MalformedClaim | Self::InvalidToken => Status::BadRequest,
            Self::GroupNotFound(_)
            | Self::PersonNotInGroup { .. }
            | Self::ElectionNotFound(_)
            | Self::CandidateNotFound(_)
            | Self::PersonNotFound(_) => Status::NotFound,
            Self::AlreadyVoted(_) | Self::CrossSlotConflict(_) | Self::DuplicateListNumber(_) => {
                Status::Conflict
            }
            Self::ElectionNotActive(..)
            | Self::ElectionLocked(..)
            | Self::CandidateNotValidated(..)
            | Self::CandidateElectionMismatch { .. }
            | Self::BlankVoteNotAllowed(_)
            | Self::NoValidatedCandidates(_)
            | Self::InvalidTransition { .. }
            | Self::InvalidElection(_) => Status::UnprocessableEntity,
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let (status, body) = match self {
            Self::Vote(err) => (
                err.status(),
                ErrorBody {
                    error: err.kind(),
                    message: err.to_string(),
                },
            ),
            Self::Status(status, message) => (
                status,
                ErrorBody {
                    error: status.reason().unwrap_or("Error"),
                    message,
                },
            ),
            Self::Db(err) => {
                error!("Database error: {err}");
                (
                    Status::InternalServerError,
                    ErrorBody {
                        error: "StorageFailure",
                        message: "The request could not be completed by storage, please try again".to_string(),
                    },
                )
            }
        };
        Custom(status, Json(body)).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_actionable() {
        let at = "2024-05-02T10:15:00Z".parse::<DateTime<Utc>>().unwrap();
        let err = VoteError::AlreadyVoted(at);
        assert!(err.to_string().contains("2024-05-02 10:15:00 UTC"));
        assert_eq!(err.status(), Status::Conflict);

        let err = VoteError::CrossSlotConflict("morning".to_string());
        assert!(err.to_string().contains("morning"));

        let err = VoteError::PersonNotInGroup {
            document: "999".to_string(),
            group: Some("G1".to_string()),
        };
        assert_eq!(err.to_string(), "Document 999 is not registered in group G1");
        assert_eq!(err.kind(), "PersonNotInGroup");
    }

    #[test]
    fn transaction_labels_are_transient() {
        use crate::model::mongodb::labelled_error;

        assert!(Error::from(labelled_error(TRANSIENT_TRANSACTION_ERROR)).is_transient());
        assert!(Error::from(labelled_error(UNKNOWN_TRANSACTION_COMMIT_RESULT)).is_transient());
        assert!(!Error::from(labelled_error("NoWritesPerformed")).is_transient());
    }

    #[test]
    fn domain_errors_are_not_transient() {
        let err = Error::from(VoteError::AlreadyVoted(Utc::now()));
        assert!(!err.is_transient());
        assert!(!Error::not_found("Election 4".to_string()).is_transient());
    }
}
