use std::sync::Arc;

use log::{info, warn};
use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::vote::{CastReceipt, CastRequest, Identified},
    common::{claim::RawIdentification, election::ElectionId},
    station::StationContext,
    store::{Db, Storage},
};
use crate::voting::{eligibility, identity, token, Publisher, VerificationHasher, VoteCaster};
use crate::Config;

pub fn routes() -> Vec<Route> {
    routes![identify, cast_vote]
}

/// Check a voter's identification ahead of casting and hand back a token to vote with.
/// Nothing is recorded, so a later cast can still be refused.
#[post("/identify/<election_id>", data = "<raw>", format = "json")]
async fn identify(
    election_id: ElectionId,
    raw: Json<RawIdentification>,
    station: StationContext,
    db: &State<Db>,
) -> Result<Json<Identified>> {
    let result = identify_claim(db.inner().as_ref(), election_id, raw.0, &station).await;
    match &result {
        Ok(identified) => info!(
            "req{} station {}: identified document {} for election {election_id} by {}",
            station.request_id,
            station.station,
            identified.claim.document_number,
            identified.claim.method
        ),
        Err(e) => warn!(
            "req{} station {}: identification refused for election {election_id}: {e}",
            station.request_id, station.station
        ),
    }
    result.map(Json)
}

async fn identify_claim(
    db: &dyn Storage,
    election_id: ElectionId,
    raw: RawIdentification,
    station: &StationContext,
) -> Result<Identified> {
    let claim = identity::resolve(raw, station)?;
    let election = eligibility::active_election(db, election_id).await?;
    let claim = eligibility::validate(db, claim, &election).await?;
    Ok(Identified {
        token: token::encode(&claim),
        claim,
    })
}

#[post("/votes", data = "<request>", format = "json")]
async fn cast_vote(
    request: Json<CastRequest>,
    station: StationContext,
    db: &State<Db>,
    hasher: &State<Arc<dyn VerificationHasher>>,
    publisher: &State<Publisher>,
    config: &State<Config>,
) -> Result<Json<CastReceipt>> {
    let caster = VoteCaster::new(
        db.inner().clone(),
        hasher.inner().clone(),
        publisher.inner().clone(),
        config.cast_attempts(),
    );
    let receipt = caster.cast(request.0, &station).await?;
    Ok(Json(receipt))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Header, Status},
        local::asynchronous::{Client, LocalResponse},
        serde::json::{json, serde_json, Value},
    };

    use crate::model::{
        api::election::ElectionSpec,
        common::election::{CandidateId, ElectionState},
        station::STATION_HEADER,
        store::examples::StorageExamples,
    };

    use super::*;

    #[backend_test]
    async fn identify_then_cast(client: Client, db: Db) {
        let (election, validated, _) = db
            .active_election_with_candidates(ElectionSpec::current_example())
            .await;

        let body = json!({"groupNumber": "G1", "documentNumber": "123"});
        let response = post_identify(&client, election.id, &body).await;
        assert_eq!(Status::Ok, response.status());
        let identified: Identified =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(identified.claim.document_number, "123");
        assert_eq!(identified.claim.person_id, Some(1));
        assert_eq!(identified.claim.display_name.as_deref(), Some("Ana Pérez"));

        let response = post_vote(&client, election.id, Some(validated.id), &identified.token).await;
        assert_eq!(Status::Ok, response.status());
        let receipt: CastReceipt =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(receipt.verification_hash.len(), 64);

        let stored = db.election(election.id).await.unwrap().unwrap();
        assert_eq!(stored.votes_cast, 1);

        // The same person can neither identify nor vote again.
        let response = post_identify(&client, election.id, &body).await;
        assert_error(response, Status::Conflict, "AlreadyVoted").await;
        let response = post_vote(&client, election.id, Some(validated.id), &identified.token).await;
        assert_error(response, Status::Conflict, "AlreadyVoted").await;

        let stored = db.election(election.id).await.unwrap().unwrap();
        assert_eq!(stored.votes_cast, 1);
    }

    #[backend_test]
    async fn identification_refusals(client: Client, db: Db) {
        let (election, ..) = db
            .active_election_with_candidates(ElectionSpec::current_example())
            .await;

        let response = post_identify(
            &client,
            election.id,
            &json!({"groupNumber": "G9", "documentNumber": "123"}),
        )
        .await;
        assert_error(response, Status::NotFound, "GroupNotFound").await;

        let response = post_identify(
            &client,
            election.id,
            &json!({"groupNumber": "G1", "documentNumber": "999"}),
        )
        .await;
        assert_error(response, Status::NotFound, "PersonNotInGroup").await;

        let response = post_identify(&client, election.id, &json!({"document": "   "})).await;
        assert_error(response, Status::BadRequest, "MalformedClaim").await;

        let response = post_identify(&client, 404, &json!({"document": "123"})).await;
        assert_error(response, Status::NotFound, "ElectionNotFound").await;

        let draft = db.insert_election(ElectionSpec::current_example()).await.unwrap();
        let response = post_identify(&client, draft.id, &json!({"document": "123"})).await;
        assert_error(response, Status::UnprocessableEntity, "ElectionNotActive").await;
    }

    #[backend_test]
    async fn scanned_credential(client: Client, db: Db) {
        let (election, ..) = db
            .active_election_with_candidates(ElectionSpec::current_example())
            .await;
        let credential = json!({"documento": "777", "nombre": "D. Ruiz"}).to_string();

        let response = client
            .post(uri!(identify(election.id)))
            .header(ContentType::JSON)
            .header(Header::new(STATION_HEADER, "mesa-7"))
            .body(json!({ "credential": credential }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let identified: Identified =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(identified.claim.document_number, "777");
        assert_eq!(identified.claim.display_name.as_deref(), Some("D. Ruiz"));
        assert_eq!(identified.claim.person_id, Some(4));
    }

    #[backend_test]
    async fn cast_refusals(client: Client, db: Db) {
        let (election, validated, pending) = db
            .active_election_with_candidates(ElectionSpec::current_example())
            .await;
        let token = identify_document(&client, election.id, "456").await;

        let response = post_vote(&client, election.id, Some(validated.id), "not a token").await;
        assert_error(response, Status::BadRequest, "InvalidToken").await;

        let response = post_vote(&client, election.id, Some(pending.id), &token).await;
        assert_error(response, Status::UnprocessableEntity, "CandidateNotValidated").await;

        let response = post_vote(&client, election.id, Some(9000), &token).await;
        assert_error(response, Status::NotFound, "CandidateNotFound").await;

        // Nothing was recorded, so a valid vote still goes through.
        let response = post_vote(&client, election.id, None, &token).await;
        assert_eq!(Status::Ok, response.status());

        db.set_state(election.id, ElectionState::Activa, ElectionState::Finalizada)
            .await
            .unwrap();
        let token = unchecked_token("123");
        let response = post_vote(&client, election.id, Some(validated.id), &token).await;
        assert_error(response, Status::UnprocessableEntity, "ElectionNotActive").await;
    }

    #[backend_test]
    async fn slots_share_one_vote(client: Client, db: Db) {
        let (morning, ..) = db
            .active_election_with_candidates(ElectionSpec::slotted_example("mañana"))
            .await;
        let (evening, ..) = db
            .active_election_with_candidates(ElectionSpec::slotted_example("noche"))
            .await;
        assert_eq!(morning.sibling_key, evening.sibling_key);

        let token = identify_document(&client, morning.id, "123").await;
        let response = post_vote(&client, morning.id, None, &token).await;
        // Slotted examples don't allow blank votes.
        assert_error(response, Status::UnprocessableEntity, "BlankVoteNotAllowed").await;

        let candidate = db.candidates(morning.id).await.unwrap()[0].id;
        let response = post_vote(&client, morning.id, Some(candidate), &token).await;
        assert_eq!(Status::Ok, response.status());

        let response = post_identify(&client, evening.id, &json!({"document": "123"})).await;
        assert_error(response, Status::Conflict, "CrossSlotConflict").await;
    }

    /// A token for a claim that was never checked. The caster must not trust it.
    fn unchecked_token(document: &str) -> String {
        use crate::model::common::claim::{IdentificationMethod, VoterClaim};

        let claim = VoterClaim::new(
            document,
            None,
            IdentificationMethod::ManualEntry,
            chrono::Utc::now(),
        );
        token::encode(&claim)
    }

    async fn identify_document(client: &Client, election: ElectionId, document: &str) -> String {
        let response = post_identify(client, election, &json!({ "document": document })).await;
        assert_eq!(Status::Ok, response.status());
        let identified: Identified =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        identified.token
    }

    async fn post_identify<'c>(
        client: &'c Client,
        election: ElectionId,
        body: &Value,
    ) -> LocalResponse<'c> {
        client
            .post(uri!(identify(election)))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await
    }

    async fn post_vote<'c>(
        client: &'c Client,
        election: ElectionId,
        candidate: Option<CandidateId>,
        token: &str,
    ) -> LocalResponse<'c> {
        let request = CastRequest {
            election_id: election,
            candidate_id: candidate,
            token: token.to_string(),
        };
        client
            .post(uri!(cast_vote))
            .header(ContentType::JSON)
            .body(json!(request).to_string())
            .dispatch()
            .await
    }

    async fn assert_error(response: LocalResponse<'_>, status: Status, kind: &str) {
        assert_eq!(status, response.status());
        let body: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["error"], kind);
    }
}
