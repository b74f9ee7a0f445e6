//! Advisory lookups for the voting station UI. None of these are authoritative: a vote can
//! still be refused after a lookup said it would be fine.

use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::lookup::{GroupLookup, OtherSlotVote, PersonLookup, PriorVote},
    common::election::ElectionId,
    store::Db,
};
use crate::voting::eligibility;

pub fn routes() -> Vec<Route> {
    routes![group, person_in_group, prior_vote, other_slot_vote]
}

#[get("/groups/<number>")]
async fn group(number: &str, db: &State<Db>) -> Result<Json<GroupLookup>> {
    let lookup = eligibility::lookup_group(db.inner().as_ref(), number).await?;
    Ok(Json(lookup))
}

#[get("/groups/<number>/persons/<document>")]
async fn person_in_group(
    number: &str,
    document: &str,
    db: &State<Db>,
) -> Result<Json<PersonLookup>> {
    let lookup =
        eligibility::lookup_person_in_group(db.inner().as_ref(), number, document).await?;
    Ok(Json(lookup))
}

#[get("/elections/<election_id>/voters/<document>/status")]
async fn prior_vote(
    election_id: ElectionId,
    document: &str,
    db: &State<Db>,
) -> Result<Json<PriorVote>> {
    let lookup = eligibility::prior_vote(db.inner().as_ref(), document, election_id).await?;
    Ok(Json(lookup))
}

#[get("/elections/<election_id>/voters/<document>/slots")]
async fn other_slot_vote(
    election_id: ElectionId,
    document: &str,
    db: &State<Db>,
) -> Result<Json<OtherSlotVote>> {
    let lookup = eligibility::other_slot_vote(db.inner().as_ref(), document, election_id).await?;
    Ok(Json(lookup))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rocket::{
        http::Status,
        local::asynchronous::Client,
        serde::json::{serde_json, Value},
    };

    use crate::model::{
        api::election::ElectionSpec, db::vote::Vote, store::examples::StorageExamples,
    };

    use super::*;

    #[backend_test]
    async fn group_lookups(client: Client) {
        let response = client.get(uri!(group("G1"))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let lookup: GroupLookup =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(lookup.exists);
        assert_eq!(lookup.group.unwrap().slot, "mañana");

        // Missing groups are an answer, not an error.
        let response = client.get(uri!(group("G9"))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let body: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["exists"], false);
        assert!(body.get("group").is_none());

        let response = client
            .get(uri!(person_in_group("G1", "456")))
            .dispatch()
            .await;
        let lookup: PersonLookup =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(lookup.exists);
        assert_eq!(lookup.person.unwrap().name, "Bruno Díaz");

        // Registered, but in a different group.
        let response = client
            .get(uri!(person_in_group("G1", "999")))
            .dispatch()
            .await;
        let lookup: PersonLookup =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(!lookup.exists);
    }

    #[backend_test]
    async fn vote_lookups(client: Client, db: Db) {
        let (morning, ..) = db
            .active_election_with_candidates(ElectionSpec::slotted_example("mañana"))
            .await;
        let (evening, ..) = db
            .active_election_with_candidates(ElectionSpec::slotted_example("noche"))
            .await;

        let cast_at = Utc::now();
        db.record_vote(&Vote {
            election_id: morning.id,
            candidate_id: None,
            person_id: 1,
            sibling_key: morning.sibling_key.clone(),
            slot: morning.slot.clone(),
            cast_at,
            verification_hash: "00".to_string(),
        })
        .await
        .unwrap();

        let response = client
            .get(uri!(prior_vote(morning.id, "123")))
            .dispatch()
            .await;
        let lookup: PriorVote =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(lookup.has_voted);
        assert_eq!(lookup.voted_at, Some(cast_at));

        let response = client
            .get(uri!(prior_vote(evening.id, "123")))
            .dispatch()
            .await;
        let lookup: PriorVote =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(!lookup.has_voted);

        let response = client
            .get(uri!(other_slot_vote(evening.id, "123")))
            .dispatch()
            .await;
        let lookup: OtherSlotVote =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(lookup.has_voted_in_other_slot);
        assert_eq!(lookup.slot.as_deref(), Some("mañana"));

        let response = client
            .get(uri!(other_slot_vote(morning.id, "456")))
            .dispatch()
            .await;
        let lookup: OtherSlotVote =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(!lookup.has_voted_in_other_slot);

        let response = client
            .get(uri!(prior_vote(404, "123")))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }
}
