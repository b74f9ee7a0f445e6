//! Administrative operations on elections and their candidate rosters, all gated by the
//! election's lifecycle state.

use std::collections::HashMap;

use log::info;

use crate::error::{Error, Result, VoteError};
use crate::model::{
    api::{
        candidate::{CandidateDescription, CandidateSpec},
        election::ElectionSpec,
        results::{CandidateTotal, ElectionResults},
    },
    common::{
        candidate::CandidateState,
        election::{CandidateId, ElectionAction, ElectionId, ElectionState},
    },
    db::{
        candidate::{Candidate, NewCandidate},
        election::Election,
        roster::Person,
    },
    store::Storage,
};

/// Create a new election in `configuracion`.
pub async fn create_election(db: &dyn Storage, spec: ElectionSpec) -> Result<Election> {
    spec.validate()?;
    let election = db.insert_election(spec).await?;
    info!("Created election {} ({})", election.id, election.title);
    Ok(election)
}

pub async fn election(db: &dyn Storage, id: ElectionId) -> Result<Election> {
    Ok(db
        .election(id)
        .await?
        .ok_or(VoteError::ElectionNotFound(id))?)
}

/// Load an election whose candidate roster may still change.
async fn editable_election(db: &dyn Storage, id: ElectionId) -> Result<Election> {
    let election = election(db, id).await?;
    if !election.state.roster_editable() {
        return Err(VoteError::ElectionLocked(id, election.state).into());
    }
    Ok(election)
}

async fn candidate(db: &dyn Storage, id: CandidateId) -> Result<Candidate> {
    Ok(db
        .candidate(id)
        .await?
        .ok_or(VoteError::CandidateNotFound(id))?)
}

async fn person_by_document(db: &dyn Storage, document: &str) -> Result<Person> {
    let document = document.trim();
    Ok(db
        .person_by_document(document)
        .await?
        .ok_or_else(|| VoteError::PersonNotFound(document.to_string()))?)
}

/// Every candidate of an election, in list number order.
pub async fn candidates(db: &dyn Storage, id: ElectionId) -> Result<Vec<CandidateDescription>> {
    election(db, id).await?;
    let mut descriptions = Vec::new();
    for candidate in db.candidates(id).await? {
        let person = db.person(candidate.person_id).await?;
        descriptions.push(CandidateDescription::new(candidate, person.as_ref()));
    }
    Ok(descriptions)
}

/// Propose a candidate. New candidates are pending until validated.
pub async fn add_candidate(
    db: &dyn Storage,
    election_id: ElectionId,
    spec: CandidateSpec,
) -> Result<CandidateDescription> {
    editable_election(db, election_id).await?;
    let person = person_by_document(db, &spec.document_number).await?;
    let candidate = db
        .insert_candidate(NewCandidate {
            election_id,
            list_number: spec.list_number,
            person_id: person.id,
        })
        .await?;
    Ok(CandidateDescription::new(candidate, Some(&person)))
}

/// Change a candidate's list number or person.
pub async fn update_candidate(
    db: &dyn Storage,
    id: CandidateId,
    spec: CandidateSpec,
) -> Result<CandidateDescription> {
    let mut candidate = candidate(db, id).await?;
    editable_election(db, candidate.election_id).await?;
    let person = person_by_document(db, &spec.document_number).await?;
    if candidate.person_id != person.id {
        // A different person needs reviewing again.
        candidate.state = CandidateState::Pending;
    }
    candidate.list_number = spec.list_number;
    candidate.person_id = person.id;
    db.replace_candidate(&candidate).await?;
    Ok(CandidateDescription::new(candidate, Some(&person)))
}

/// Validate or reject a candidate.
pub async fn review_candidate(
    db: &dyn Storage,
    id: CandidateId,
    state: CandidateState,
) -> Result<CandidateDescription> {
    let mut candidate = candidate(db, id).await?;
    editable_election(db, candidate.election_id).await?;
    candidate.state = state;
    db.replace_candidate(&candidate).await?;
    let person = db.person(candidate.person_id).await?;
    Ok(CandidateDescription::new(candidate, person.as_ref()))
}

pub async fn remove_candidate(db: &dyn Storage, id: CandidateId) -> Result<()> {
    let candidate = candidate(db, id).await?;
    editable_election(db, candidate.election_id).await?;
    if !db.delete_candidate(id).await? {
        return Err(VoteError::CandidateNotFound(id).into());
    }
    Ok(())
}

/// Apply a lifecycle action, other than delete.
///
/// Actions that are already satisfied succeed without changing anything. State changes are
/// compare-and-set, so a concurrent change is re-evaluated rather than overwritten.
async fn transition(
    db: &dyn Storage,
    id: ElectionId,
    action: ElectionAction,
    blank_only: bool,
) -> Result<Election> {
    loop {
        let election = election(db, id).await?;
        let Some(target) = election.state.apply(action)? else {
            return Ok(election);
        };
        if action == ElectionAction::Activate {
            check_can_activate(db, &election, blank_only).await?;
        }
        if db.set_state(id, election.state, target).await? {
            info!("Election {id}: {} -> {target}", election.state);
            let mut election = election;
            election.state = target;
            return Ok(election);
        }
    }
}

/// An election needs at least one validated candidate to open, unless it is explicitly
/// opened for blank votes only.
async fn check_can_activate(db: &dyn Storage, election: &Election, blank_only: bool) -> Result<()> {
    if blank_only {
        return if election.allows_blank_vote {
            Ok(())
        } else {
            Err(VoteError::BlankVoteNotAllowed(election.id).into())
        };
    }
    let validated = db
        .candidates(election.id)
        .await?
        .iter()
        .any(|c| c.state == CandidateState::Validated);
    if !validated {
        return Err(VoteError::NoValidatedCandidates(election.id).into());
    }
    Ok(())
}

pub async fn activate(db: &dyn Storage, id: ElectionId, blank_only: bool) -> Result<Election> {
    transition(db, id, ElectionAction::Activate, blank_only).await
}

pub async fn finalize(db: &dyn Storage, id: ElectionId) -> Result<Election> {
    transition(db, id, ElectionAction::Finalize, false).await
}

pub async fn cancel(db: &dyn Storage, id: ElectionId) -> Result<Election> {
    transition(db, id, ElectionAction::Cancel, false).await
}

/// Permanently delete a cancelled election with its candidates, votes and enabled voters.
pub async fn delete(db: &dyn Storage, id: ElectionId) -> Result<()> {
    let election = election(db, id).await?;
    election.state.apply(ElectionAction::Delete)?;
    if !db.delete_cancelled_election(id).await? {
        // Cancelled is terminal, so the only way to get here is a concurrent delete.
        return Err(VoteError::ElectionNotFound(id).into());
    }
    info!("Deleted election {id}");
    Ok(())
}

/// Enable every member of a group to vote in an election.
pub async fn enable_group(db: &dyn Storage, id: ElectionId, number: &str) -> Result<Election> {
    let election = election(db, id).await?;
    if matches!(
        election.state,
        ElectionState::Finalizada | ElectionState::Cancelada
    ) {
        return Err(VoteError::ElectionLocked(id, election.state).into());
    }
    let number = number.trim();
    let group = db
        .group_by_number(number)
        .await?
        .ok_or_else(|| VoteError::GroupNotFound(number.to_string()))?;
    let persons: Vec<_> = db
        .persons_in_group(group.id)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    let election = db.enable_voters(id, &persons).await?;
    info!(
        "Election {id}: enabled {} members of group {number}, {} voters in total",
        persons.len(),
        election.enabled_voters
    );
    Ok(election)
}

/// Vote totals of a closed election.
pub async fn results(db: &dyn Storage, id: ElectionId) -> Result<ElectionResults> {
    let election = election(db, id).await?;
    if !matches!(
        election.state,
        ElectionState::Finalizada | ElectionState::Cancelada
    ) {
        return Err(Error::not_found(format!("Results for election {id}")));
    }

    let mut tally: HashMap<_, _> = db.tally(id).await?;
    let blank_votes = tally.remove(&None).unwrap_or(0);
    let mut candidates = Vec::new();
    for candidate in db.candidates(id).await? {
        let name = db
            .person(candidate.person_id)
            .await?
            .map(|p| p.name)
            .unwrap_or_default();
        candidates.push(CandidateTotal {
            candidate_id: candidate.id,
            list_number: candidate.list_number,
            name,
            votes: tally.get(&Some(candidate.id)).copied().unwrap_or(0),
        });
    }
    let turnout = (election.enabled_voters > 0)
        .then(|| f64::from(election.votes_cast) / f64::from(election.enabled_voters));

    Ok(ElectionResults {
        election_id: id,
        title: election.title.clone(),
        state: election.state,
        enabled_voters: election.enabled_voters,
        votes_cast: election.votes_cast,
        blank_votes,
        candidates,
        turnout,
    })
}
