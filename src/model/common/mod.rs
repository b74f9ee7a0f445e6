//! Types shared between the database and API representations.

pub mod candidate;
pub mod claim;
pub mod election;
