//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs are integers stored under `_id`.
//! - Datetimes are serialised in MongoDB's own format.

pub mod candidate;
pub mod election;
pub mod roster;
pub mod vote;
