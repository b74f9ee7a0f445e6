use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{
        candidate::CandidateDescription, election::ElectionDescription,
        results::ElectionResults,
    },
    common::election::ElectionId,
    store::Db,
};
use crate::voting::lifecycle;

pub fn routes() -> Vec<Route> {
    routes![elections, election, candidates, results]
}

#[get("/elections")]
async fn elections(db: &State<Db>) -> Result<Json<Vec<ElectionDescription>>> {
    let elections = db.elections().await?;
    Ok(Json(elections.into_iter().map(Into::into).collect()))
}

#[get("/elections/<election_id>")]
async fn election(election_id: ElectionId, db: &State<Db>) -> Result<Json<ElectionDescription>> {
    let election = lifecycle::election(db.inner().as_ref(), election_id).await?;
    Ok(Json(election.into()))
}

#[get("/elections/<election_id>/candidates")]
async fn candidates(
    election_id: ElectionId,
    db: &State<Db>,
) -> Result<Json<Vec<CandidateDescription>>> {
    let candidates = lifecycle::candidates(db.inner().as_ref(), election_id).await?;
    Ok(Json(candidates))
}

/// Totals are only published once an election is closed.
#[get("/elections/<election_id>/results")]
async fn results(election_id: ElectionId, db: &State<Db>) -> Result<Json<ElectionResults>> {
    let results = lifecycle::results(db.inner().as_ref(), election_id).await?;
    Ok(Json(results))
}
