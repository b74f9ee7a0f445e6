#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod finalizer;
pub mod logging;
pub mod model;
pub mod scheduled_task;
pub mod voting;

pub use config::Config;
pub use finalizer::ElectionFinalizers;

use config::{ConfigFairing, PublisherFairing, StoreFairing};
use finalizer::ElectionFinalizerFairing;
use logging::LoggerFairing;

/// Build the server from `Rocket.toml` and the environment.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StoreFairing)
        .attach(PublisherFairing)
        .attach(ElectionFinalizerFairing)
}

/// Build a server for tests around the given store.
#[cfg(test)]
pub(crate) fn rocket_for_store(db: model::store::Db) -> Rocket<Build> {
    use std::sync::Arc;

    use voting::{LogPublisher, Publisher};

    let figment = rocket::Config::figment()
        .merge(("hmac_secret", "test secret"))
        .merge(("cast_attempts", 3))
        .merge(("log_level", "off"));
    let publisher: Publisher = Arc::new(LogPublisher);
    rocket::custom(figment)
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .manage(db)
        .manage(publisher)
        .attach(ElectionFinalizerFairing)
}
