//! For some reason, the mongodb crate doesn't provide error code constants.
//! This module fills in the gaps.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

pub const DUPLICATE_KEY: i32 = 11000;

/// Return true if the given error is a duplicate key write error.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(ref e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Example data for tests.
#[cfg(test)]
pub mod examples {
    use mongodb::{
        bson::{doc, from_document},
        error::WriteConcernError,
    };

    use super::*;

    /// A write conflict carrying the given error label, as the server reports it.
    pub fn labelled_error(label: &str) -> DbError {
        let failure: WriteConcernError = from_document(doc! {
            "code": 112,
            "codeName": "WriteConflict",
            "errmsg": "Write conflict during plan execution",
            "errorLabels": [label],
        })
        .unwrap();
        ErrorKind::Write(WriteFailure::WriteConcernError(failure)).into()
    }
}
