mod kind;
mod state;

pub use kind::ElectionType;
pub use state::{ElectionAction, ElectionState};

/// Our election IDs are integers.
pub type ElectionId = u32;
/// Our candidate IDs are integers.
pub type CandidateId = u32;
/// Our group ("ficha") IDs are integers.
pub type GroupId = u32;
/// Our person IDs are integers.
pub type PersonId = u32;
