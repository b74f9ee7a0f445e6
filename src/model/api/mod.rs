//! API-friendly (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - Field names are camelCase.
//! - Datetimes are serialised as RFC 3339 strings.

pub mod candidate;
pub mod election;
pub mod lookup;
pub mod results;
pub mod vote;
