//! The voting core: from raw station input to a stored, single-use vote.
//!
//! [`identity`] normalises input into a claim, [`eligibility`] checks the claim against the
//! roster and prior votes, [`token`] carries the claim between the pre-check and the cast,
//! and [`caster`] stores the vote. [`lifecycle`] gates all of it by election state.

pub mod caster;
pub mod eligibility;
pub mod hasher;
pub mod identity;
pub mod lifecycle;
pub mod publisher;
pub mod token;

pub use caster::VoteCaster;
pub use hasher::{HmacHasher, VerificationHasher};
pub use publisher::{LogPublisher, Publisher, SnsPublisher, VotePublisher};
