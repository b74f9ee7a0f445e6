mod collection;
mod counter;
mod errors;

pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use counter::{
    ensure_counters_exist, Counter, CANDIDATE_ID_COUNTER_ID, ELECTION_ID_COUNTER_ID,
    GROUP_ID_COUNTER_ID, PERSON_ID_COUNTER_ID,
};
pub use errors::is_duplicate_key_error;

#[cfg(test)]
pub use errors::examples::labelled_error;
