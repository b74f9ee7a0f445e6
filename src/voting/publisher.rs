//! Real-time notification of cast votes, for dashboards.

use std::sync::Arc;

use aws_sdk_sns::{error::DisplayErrorContext, Client as SnsClient};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rocket::serde::json::serde_json;
use rocket::tokio;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::common::election::ElectionId;

/// Published after every successful cast. Says nothing about who voted or for whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteCast {
    pub election_id: ElectionId,
    pub votes_cast: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error)]
#[error("Failed to publish vote event: {0}")]
pub struct PublishError(String);

#[rocket::async_trait]
pub trait VotePublisher: Send + Sync {
    async fn publish(&self, event: &VoteCast) -> Result<(), PublishError>;
}

/// Shared handle to the publisher, kept in Rocket's managed state.
pub type Publisher = Arc<dyn VotePublisher>;

/// Publish to an Amazon SNS topic.
pub struct SnsPublisher {
    client: SnsClient,
    topic_arn: String,
}

impl SnsPublisher {
    pub fn new(client: SnsClient, topic_arn: String) -> Self {
        Self { client, topic_arn }
    }
}

#[rocket::async_trait]
impl VotePublisher for SnsPublisher {
    async fn publish(&self, event: &VoteCast) -> Result<(), PublishError> {
        let message = serde_json::to_string(event).expect("Serialisation is infallible");
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(message)
            .send()
            .await
            .map_err(|e| PublishError(DisplayErrorContext(e).to_string()))?;
        Ok(())
    }
}

/// Just log the event. Used when no topic is configured.
pub struct LogPublisher;

#[rocket::async_trait]
impl VotePublisher for LogPublisher {
    async fn publish(&self, event: &VoteCast) -> Result<(), PublishError> {
        info!(
            "Election {} now has {} votes",
            event.election_id, event.votes_cast
        );
        Ok(())
    }
}

/// Publish in the background. The caller never waits, and a failure is only logged.
pub fn publish_detached(publisher: Publisher, event: VoteCast) {
    tokio::spawn(async move {
        match publisher.publish(&event).await {
            Ok(()) => debug!("Published vote event for election {}", event.election_id),
            Err(e) => warn!("{e}"),
        }
    });
}
