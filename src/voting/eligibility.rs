//! Eligibility: may this person vote in this election right now?
//!
//! Everything in this module is advisory when called ahead of a cast. The only
//! authoritative double-vote check is the atomic insert in [`Storage::record_vote`].

use crate::error::{Error, Result, VoteError};
use crate::model::{
    api::lookup::{GroupLookup, OtherSlotVote, PersonLookup, PriorVote},
    common::{
        claim::VoterClaim,
        election::{ElectionId, PersonId},
    },
    db::{
        election::Election,
        roster::{Group, Person},
    },
    store::Storage,
};

/// Load an election that is currently accepting votes.
pub async fn active_election(db: &dyn Storage, id: ElectionId) -> Result<Election> {
    let election = db
        .election(id)
        .await?
        .ok_or(VoteError::ElectionNotFound(id))?;
    if !election.state.accepts_votes() {
        return Err(VoteError::ElectionNotActive(id, election.state).into());
    }
    Ok(election)
}

/// Resolve the claimed person, checking group membership if the claim names a group.
/// Returns the person and their group, if one was claimed.
pub async fn identify_person(
    db: &dyn Storage,
    claim: &VoterClaim,
) -> Result<(Person, Option<Group>)> {
    let group = match claim.group_number.as_deref() {
        Some(number) => Some(
            db.group_by_number(number)
                .await?
                .ok_or_else(|| VoteError::GroupNotFound(number.to_string()))?,
        ),
        None => None,
    };

    let not_in_group = || VoteError::PersonNotInGroup {
        document: claim.document_number.clone(),
        group: claim.group_number.clone(),
    };
    let person = db
        .person_by_document(&claim.document_number)
        .await?
        .ok_or_else(not_in_group)?;
    if let Some(group) = &group {
        if person.group_id != Some(group.id) {
            return Err(not_in_group().into());
        }
    }
    Ok((person, group))
}

/// Fail if the person already has a vote in this election or any of its siblings.
pub async fn check_not_voted(db: &dyn Storage, election: &Election, person: PersonId) -> Result<()> {
    match db.participation(&election.sibling_key, person).await? {
        Some(prior) => Err(prior.conflict_for(election.id).into()),
        None => Ok(()),
    }
}

/// Run every eligibility check in order, returning the claim with the person resolved.
pub async fn validate(
    db: &dyn Storage,
    mut claim: VoterClaim,
    election: &Election,
) -> Result<VoterClaim> {
    let (person, group) = identify_person(db, &claim).await?;
    check_not_voted(db, election, person.id).await?;

    claim.person_id = Some(person.id);
    if claim.display_name.is_none() {
        claim.display_name = Some(person.name);
    }
    if claim.program.is_none() {
        claim.program = group.map(|g| g.program);
    }
    Ok(claim)
}

/// Does the group exist?
pub async fn lookup_group(db: &dyn Storage, number: &str) -> Result<GroupLookup> {
    let group = db.group_by_number(number.trim()).await?;
    Ok(GroupLookup {
        exists: group.is_some(),
        group: group.map(Into::into),
    })
}

/// Does the document belong to someone in the group?
pub async fn lookup_person_in_group(
    db: &dyn Storage,
    number: &str,
    document: &str,
) -> Result<PersonLookup> {
    let group = db.group_by_number(number.trim()).await?;
    let person = match group {
        Some(group) => db
            .person_by_document(document.trim())
            .await?
            .filter(|p| p.group_id == Some(group.id)),
        None => None,
    };
    Ok(PersonLookup {
        exists: person.is_some(),
        person: person.map(Into::into),
    })
}

/// The participation of `document` in the sibling set of election `id`, if any.
async fn participation(
    db: &dyn Storage,
    document: &str,
    id: ElectionId,
) -> Result<Option<crate::model::db::vote::Participation>> {
    let election = db
        .election(id)
        .await?
        .ok_or_else(|| Error::from(VoteError::ElectionNotFound(id)))?;
    match db.person_by_document(document.trim()).await? {
        Some(person) => db.participation(&election.sibling_key, person.id).await,
        None => Ok(None),
    }
}

/// Has the document already voted in this exact election?
pub async fn prior_vote(db: &dyn Storage, document: &str, id: ElectionId) -> Result<PriorVote> {
    let prior = participation(db, document, id)
        .await?
        .filter(|p| p.election_id == id);
    Ok(PriorVote {
        has_voted: prior.is_some(),
        voted_at: prior.map(|p| p.cast_at),
    })
}

/// Has the document already voted in a sibling of this election?
pub async fn other_slot_vote(
    db: &dyn Storage,
    document: &str,
    id: ElectionId,
) -> Result<OtherSlotVote> {
    let prior = participation(db, document, id)
        .await?
        .filter(|p| p.election_id != id);
    Ok(OtherSlotVote {
        has_voted_in_other_slot: prior.is_some(),
        slot: prior.and_then(|p| p.slot),
    })
}
