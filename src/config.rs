use std::sync::Arc;

use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_sns::{
    config::{Credentials, Region},
    Client as SnsClient,
};
use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::store::{load_roster_file, Db, MemoryStore, MongoStore};
use crate::voting::{
    HmacHasher, LogPublisher, Publisher, SnsPublisher, VerificationHasher,
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_cast_attempts")]
    cast_attempts: u32,
    // secrets
    hmac_secret: String,
}

fn default_cast_attempts() -> u32 {
    8
}

impl Config {
    /// How many times a vote is written when storage reports transient contention.
    pub fn cast_attempts(&self) -> u32 {
        self.cast_attempts
    }

    /// Secret key used to sign verification hashes.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state,
/// together with the verification hasher keyed by it.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let hasher: Arc<dyn VerificationHasher> = Arc::new(HmacHasher::new(config.hmac_secret()));

        Ok(rocket.manage(config).manage(hasher))
    }
}

/// Which store to run against.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum StoreKind {
    #[default]
    Mongodb,
    Memory,
}

/// Configuration for the store.
#[derive(Deserialize)]
struct StoreConfig {
    // non-secrets
    #[serde(default)]
    store: StoreKind,
    #[serde(default = "default_db_name")]
    db_name: String,
    /// JSON roster file to load into the store on launch.
    roster: Option<String>,
    // secrets
    db_uri: Option<String>,
}

fn default_db_name() -> String {
    "votacion".to_string()
}

/// A fairing that loads the store config, connects to the database if there is one,
/// performs any setup necessary, loads the configured roster, and places a [`Db`] into
/// managed state.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let db: Db = match config.store {
            StoreKind::Memory => {
                warn!("Using the in-memory store, nothing will be persisted");
                Arc::new(MemoryStore::new())
            }
            StoreKind::Mongodb => {
                let Some(uri) = config.db_uri else {
                    error!("`db_uri` must be set to use the MongoDB store");
                    return Err(rocket);
                };
                info!("Loaded database config, connecting...");
                match MongoStore::connect(&uri, &config.db_name).await {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                }
            }
        };
        info!("...store online!");

        match config.roster {
            Some(path) => {
                if let Err(e) = load_roster_file(db.as_ref(), &path).await {
                    error!("Failed to load roster {path}: {e}");
                    return Err(rocket);
                }
            }
            None if config.store == StoreKind::Memory => {
                warn!("No roster configured, the in-memory store has no voters");
            }
            None => {}
        }

        Ok(rocket.manage(db))
    }
}

/// Configuration for real-time vote publishing. Publishing to SNS needs every field.
#[derive(Deserialize)]
struct PublisherConfig {
    // non-secrets
    vote_topic_arn: Option<String>,
    aws_region: Option<String>,
    aws_access_key_id: Option<String>,
    // secrets
    aws_secret_access_key: Option<String>,
}

/// A fairing that loads the AWS config and places a vote [`Publisher`] into managed
/// state: Amazon SNS if a topic is configured, otherwise the log.
pub struct PublisherFairing;

#[rocket::async_trait]
impl Fairing for PublisherFairing {
    fn info(&self) -> Info {
        Info {
            name: "Vote Publisher",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<PublisherConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load publisher config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let publisher: Publisher = match config {
            PublisherConfig {
                vote_topic_arn: Some(topic_arn),
                aws_region: Some(region),
                aws_access_key_id: Some(access_key_id),
                aws_secret_access_key: Some(secret_access_key),
            } => {
                let aws_config = SdkConfig::builder()
                    .region(Region::new(region))
                    .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                        access_key_id,
                        secret_access_key,
                        None,
                        None,
                        "rocket config",
                    )))
                    .behavior_version(BehaviorVersion::latest())
                    .build();
                info!("Publishing votes to Amazon SNS topic {topic_arn}");
                Arc::new(SnsPublisher::new(SnsClient::new(&aws_config), topic_arn))
            }
            PublisherConfig {
                vote_topic_arn: Some(_),
                ..
            } => {
                error!("`vote_topic_arn` is set, but the AWS region or credentials are not");
                return Err(rocket);
            }
            _ => {
                info!("No vote topic configured, votes will only be logged");
                Arc::new(LogPublisher)
            }
        };

        Ok(rocket.manage(publisher))
    }
}

#[cfg(test)]
mod tests {
    use rocket::{error::ErrorKind, figment::Figment};

    use super::*;

    fn memory_store_figment() -> Figment {
        rocket::Config::figment()
            .merge(("store", "memory"))
            .merge(("log_level", "off"))
    }

    #[rocket::async_test]
    async fn memory_store_loads_roster() {
        let roster = concat!(env!("CARGO_MANIFEST_DIR"), "/roster.example.json");
        let rocket = rocket::custom(memory_store_figment().merge(("roster", roster)))
            .attach(StoreFairing)
            .ignite()
            .await
            .unwrap();
        let db = rocket.state::<Db>().unwrap();
        let person = db.person_by_document("1003").await.unwrap().unwrap();
        assert_eq!(person.name, "Carla Gómez");
        assert!(db.group_by_number("2601234").await.unwrap().is_some());
    }

    #[rocket::async_test]
    async fn bad_roster_stops_launch() {
        let rocket = rocket::custom(memory_store_figment().merge(("roster", "no-such-roster.json")))
            .attach(StoreFairing)
            .ignite()
            .await;
        match rocket {
            Ok(_) => panic!("launched without its roster"),
            Err(e) => assert!(matches!(e.kind(), ErrorKind::FailedFairings(_))),
        }
    }
}
