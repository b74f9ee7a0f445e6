use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, error, info, trace, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    futures::future::{BoxFuture, FutureExt},
    tokio::sync::Mutex,
    Build, Rocket,
};

use crate::{
    error::Result,
    model::{
        common::election::{ElectionId, ElectionState},
        db::election::Election,
        store::Db,
    },
    scheduled_task::ScheduledTask,
    voting::lifecycle,
};

/// How long to wait before retrying a finalizer that failed.
const RETRY_INTERVAL_SECONDS: i64 = 300;

/// Map from election IDs to finalizer tasks.
type TaskMap = HashMap<ElectionId, ScheduledTask<()>>;

/// Election finalizers: scheduled tasks that close active elections at their end time.
pub struct ElectionFinalizers {
    db: Db,
    tasks: Arc<Mutex<TaskMap>>,
}

impl ElectionFinalizers {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            tasks: Default::default(),
        }
    }

    /// Does the given election have a finalizer scheduled?
    pub async fn has_finalizer(&self, election: ElectionId) -> bool {
        self.tasks.lock().await.contains_key(&election)
    }

    /// Schedule a finalizer for every active election.
    pub async fn schedule_elections(&self) -> Result<()> {
        let elections = self.db.elections().await?;
        for election in elections
            .iter()
            .filter(|e| e.state == ElectionState::Activa)
        {
            self.schedule_election(election).await;
        }
        Ok(())
    }

    /// Schedule a finalizer for the given election at its end time.
    /// If one already exists, it is rescheduled.
    pub async fn schedule_election(&self, election: &Election) {
        let finalizer = Self::finalizer(election.id, self.db.clone(), self.tasks.clone());
        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.remove(&election.id) {
            if task.cancel().await {
                // A finalizer only completes after removing itself, so this shouldn't happen.
                warn!("Finalizer for election {} completed while being rescheduled", election.id);
            }
        }
        debug!(
            "Election {} will be finalized at {}",
            election.id, election.end_time
        );
        tasks.insert(election.id, ScheduledTask::new(finalizer, election.end_time));
    }

    /// Drop the finalizer for an election that was closed some other way.
    pub async fn cancel_election(&self, election: ElectionId) {
        let task = self.tasks.lock().await.remove(&election);
        if let Some(task) = task {
            task.cancel().await;
            trace!("Cancelled finalizer for election {election}");
        }
    }

    /// Finalize the given election, retrying later on storage failure.
    /// Since this is a recursive async function, we must use `BoxFuture` to
    /// avoid an infinitely-recursive state machine.
    fn finalizer(
        election_id: ElectionId,
        db: Db,
        tasks: Arc<Mutex<TaskMap>>,
    ) -> BoxFuture<'static, ()> {
        async move {
            debug!("Running finalizer for election {election_id}");
            match lifecycle::finalize(db.as_ref(), election_id).await {
                Ok(election) => {
                    tasks.lock().await.remove(&election_id);
                    info!(
                        "Election {election_id} closed at its end time with {} votes",
                        election.votes_cast
                    );
                }
                // Cancelled or deleted in the meantime; nothing to do.
                Err(e) if e.as_vote_error().is_some() => {
                    tasks.lock().await.remove(&election_id);
                    debug!("Finalizer for election {election_id} had nothing to do: {e}");
                }
                Err(e) => {
                    error!("Finalizer for election {election_id} failed: {e}");
                    let retry = Self::finalizer(election_id, db, tasks.clone());
                    let retry_time = Utc::now() + Duration::seconds(RETRY_INTERVAL_SECONDS);
                    tasks
                        .lock()
                        .await
                        .insert(election_id, ScheduledTask::new(retry, retry_time));
                    warn!("Failed finalizer will be retried in {RETRY_INTERVAL_SECONDS} seconds");
                }
            }
        }
        .boxed()
    }
}

/// A fairing that schedules finalizers for all active elections during Rocket ignition,
/// and places an `ElectionFinalizers` into managed state.
/// This fairing depends on the store being available in managed state,
/// and so must be attached after the fairing responsible for that.
pub struct ElectionFinalizerFairing;

#[rocket::async_trait]
impl Fairing for ElectionFinalizerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election Finalizers",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        info!("Scheduling election finalizers...");
        let db = match rocket.state::<Db>() {
            Some(db) => db.clone(),
            None => {
                error!("Store was not available when scheduling finalizers");
                return Err(rocket);
            }
        };
        let finalizers = ElectionFinalizers::new(db);
        if let Err(e) = finalizers.schedule_elections().await {
            error!("Failed to schedule election finalizers: {e}");
            return Err(rocket);
        }
        info!("...election finalizers scheduled!");

        Ok(rocket.manage(finalizers))
    }
}

#[cfg(test)]
mod tests {
    use rocket::tokio::time;

    use super::*;
    use crate::model::{
        api::election::ElectionSpec,
        store::{examples::StorageExamples, MemoryStore, Storage},
    };

    async fn wait_for_state(db: &MemoryStore, id: ElectionId, state: ElectionState) -> bool {
        for _ in 0..200 {
            if db.election(id).await.unwrap().unwrap().state == state {
                return true;
            }
            time::sleep(time::Duration::from_millis(10)).await;
        }
        false
    }

    #[rocket::async_test]
    async fn overdue_elections_are_finalized() {
        let db = Arc::new(MemoryStore::with_roster().await);
        let mut spec = ElectionSpec::current_example();
        spec.end_time = Utc::now() + Duration::milliseconds(50);
        let (election, ..) = db.active_election_with_candidates(spec).await;
        let (open, ..) = db
            .active_election_with_candidates(ElectionSpec::current_example())
            .await;

        let finalizers = ElectionFinalizers::new(db.clone());
        finalizers.schedule_elections().await.unwrap();
        assert!(finalizers.has_finalizer(open.id).await);

        assert!(wait_for_state(&db, election.id, ElectionState::Finalizada).await);
        assert!(!finalizers.has_finalizer(election.id).await);
        assert_eq!(
            db.election(open.id).await.unwrap().unwrap().state,
            ElectionState::Activa
        );
    }

    #[rocket::async_test]
    async fn cancelled_finalizers_do_nothing() {
        let db = Arc::new(MemoryStore::with_roster().await);
        let mut spec = ElectionSpec::current_example();
        spec.end_time = Utc::now() + Duration::milliseconds(50);
        let (election, ..) = db.active_election_with_candidates(spec).await;

        let finalizers = ElectionFinalizers::new(db.clone());
        finalizers.schedule_election(&election).await;
        finalizers.cancel_election(election.id).await;
        assert!(!finalizers.has_finalizer(election.id).await);

        time::sleep(time::Duration::from_millis(150)).await;
        assert_eq!(
            db.election(election.id).await.unwrap().unwrap().state,
            ElectionState::Activa
        );
    }

    #[rocket::async_test]
    async fn cancelled_elections_are_left_alone() {
        let db = Arc::new(MemoryStore::with_roster().await);
        let mut spec = ElectionSpec::current_example();
        spec.end_time = Utc::now() + Duration::milliseconds(50);
        let (election, ..) = db.active_election_with_candidates(spec).await;
        let finalizers = ElectionFinalizers::new(db.clone());
        finalizers.schedule_election(&election).await;
        lifecycle::cancel(db.as_ref(), election.id).await.unwrap();

        for _ in 0..200 {
            if !finalizers.has_finalizer(election.id).await {
                break;
            }
            time::sleep(time::Duration::from_millis(10)).await;
        }
        assert!(!finalizers.has_finalizer(election.id).await);
        assert_eq!(
            db.election(election.id).await.unwrap().unwrap().state,
            ElectionState::Cancelada
        );
    }
}
