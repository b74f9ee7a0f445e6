use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{
        candidate::{CandidateDescription, CandidateSpec},
        election::{ElectionDescription, ElectionSpec},
    },
    common::{
        candidate::CandidateState,
        election::{CandidateId, ElectionId},
    },
    store::Db,
};
use crate::voting::lifecycle;
use crate::ElectionFinalizers;

pub fn routes() -> Vec<Route> {
    routes![
        create_election,
        add_candidate,
        update_candidate,
        validate_candidate,
        reject_candidate,
        remove_candidate,
        activate_election,
        finalize_election,
        cancel_election,
        delete_election,
        enable_group,
    ]
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    spec: Json<ElectionSpec>,
    db: &State<Db>,
) -> Result<Json<ElectionDescription>> {
    let election = lifecycle::create_election(db.inner().as_ref(), spec.0).await?;
    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/candidates", data = "<spec>", format = "json")]
async fn add_candidate(
    election_id: ElectionId,
    spec: Json<CandidateSpec>,
    db: &State<Db>,
) -> Result<Json<CandidateDescription>> {
    let candidate = lifecycle::add_candidate(db.inner().as_ref(), election_id, spec.0).await?;
    Ok(Json(candidate))
}

#[put("/candidates/<candidate_id>", data = "<spec>", format = "json")]
async fn update_candidate(
    candidate_id: CandidateId,
    spec: Json<CandidateSpec>,
    db: &State<Db>,
) -> Result<Json<CandidateDescription>> {
    let candidate = lifecycle::update_candidate(db.inner().as_ref(), candidate_id, spec.0).await?;
    Ok(Json(candidate))
}

#[post("/candidates/<candidate_id>/validate")]
async fn validate_candidate(
    candidate_id: CandidateId,
    db: &State<Db>,
) -> Result<Json<CandidateDescription>> {
    let candidate =
        lifecycle::review_candidate(db.inner().as_ref(), candidate_id, CandidateState::Validated)
            .await?;
    Ok(Json(candidate))
}

#[post("/candidates/<candidate_id>/reject")]
async fn reject_candidate(
    candidate_id: CandidateId,
    db: &State<Db>,
) -> Result<Json<CandidateDescription>> {
    let candidate =
        lifecycle::review_candidate(db.inner().as_ref(), candidate_id, CandidateState::Rejected)
            .await?;
    Ok(Json(candidate))
}

#[delete("/candidates/<candidate_id>")]
async fn remove_candidate(candidate_id: CandidateId, db: &State<Db>) -> Result<()> {
    lifecycle::remove_candidate(db.inner().as_ref(), candidate_id).await
}

/// Open an election for voting and arm its finalizer.
/// With `blank_only`, an election that allows blank votes may open without validated
/// candidates.
#[post("/elections/<election_id>/activate?<blank_only>")]
async fn activate_election(
    election_id: ElectionId,
    blank_only: Option<bool>,
    db: &State<Db>,
    finalizers: &State<ElectionFinalizers>,
) -> Result<Json<ElectionDescription>> {
    let election = lifecycle::activate(
        db.inner().as_ref(),
        election_id,
        blank_only.unwrap_or(false),
    )
    .await?;
    finalizers.schedule_election(&election).await;
    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/finalize")]
async fn finalize_election(
    election_id: ElectionId,
    db: &State<Db>,
    finalizers: &State<ElectionFinalizers>,
) -> Result<Json<ElectionDescription>> {
    let election = lifecycle::finalize(db.inner().as_ref(), election_id).await?;
    finalizers.cancel_election(election_id).await;
    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/cancel")]
async fn cancel_election(
    election_id: ElectionId,
    db: &State<Db>,
    finalizers: &State<ElectionFinalizers>,
) -> Result<Json<ElectionDescription>> {
    let election = lifecycle::cancel(db.inner().as_ref(), election_id).await?;
    finalizers.cancel_election(election_id).await;
    Ok(Json(election.into()))
}

#[delete("/elections/<election_id>")]
async fn delete_election(election_id: ElectionId, db: &State<Db>) -> Result<()> {
    lifecycle::delete(db.inner().as_ref(), election_id).await
}

/// Enable every member of a group to vote in an election.
#[post("/elections/<election_id>/groups/<number>")]
async fn enable_group(
    election_id: ElectionId,
    number: &str,
    db: &State<Db>,
) -> Result<Json<ElectionDescription>> {
    let election = lifecycle::enable_group(db.inner().as_ref(), election_id, number).await?;
    Ok(Json(election.into()))
}
