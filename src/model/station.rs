use std::convert::Infallible;

use chrono::{DateTime, Utc};
use rocket::request::{FromRequest, Outcome};
use rocket::Request;

use crate::logging::RequestId;

/// Header a voting station uses to identify itself.
pub const STATION_HEADER: &str = "X-Voting-Station";

/// Stations that don't send [`STATION_HEADER`] are logged under this name.
pub const UNASSIGNED_STATION: &str = "unassigned";

/// Where and when a voting-station request came from.
///
/// Passed explicitly into identity resolution and vote casting, so that neither needs to
/// look at the request itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationContext {
    pub station: String,
    pub request_id: RequestId,
    pub received_at: DateTime<Utc>,
}

impl StationContext {
    pub fn new(station: impl Into<String>, request_id: RequestId) -> Self {
        Self {
            station: station.into(),
            request_id,
            received_at: Utc::now(),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for StationContext {
    type Error = Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let station = req
            .headers()
            .get_one(STATION_HEADER)
            .map(str::trim)
            .filter(|station| !station.is_empty())
            .unwrap_or(UNASSIGNED_STATION);
        let request_id = *req.local_cache(RequestId::next);
        Outcome::Success(Self::new(station, request_id))
    }
}
