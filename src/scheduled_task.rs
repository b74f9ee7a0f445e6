use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use rocket::tokio::{
    self,
    sync::Notify,
    task::{JoinError, JoinHandle},
    time::Duration,
};

/// A task scheduled for a specific point in the future.
/// It runs by itself at that point, unless cancelled or triggered early.
pub struct ScheduledTask<T> {
    handle: JoinHandle<T>,
    trigger: Arc<Notify>,
}

impl<T> ScheduledTask<T>
where
    T: Send + 'static,
{
    /// Schedule `task` to run at `run_at`, or immediately if that is in the past.
    pub fn new<Fut>(task: Fut, run_at: DateTime<Utc>) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let trigger = Arc::new(Notify::new());
        let early = trigger.clone();
        let delay = until(run_at);
        let handle = tokio::spawn(async move {
            // Whichever comes first: the deadline, or an early trigger.
            let _ = tokio::time::timeout(delay, early.notified()).await;
            task.await
        });
        Self { handle, trigger }
    }

    /// Cancel the task. Returns true iff it had already completed before we could cancel it.
    pub async fn cancel(self) -> bool {
        self.handle.abort();
        self.handle.await.is_ok()
    }

    /// Run the task now instead of waiting for its time.
    pub fn trigger_now(&self) {
        // `notify_one` stores a permit, so this works even before the task starts waiting.
        self.trigger.notify_one();
    }
}

impl<T> Future for ScheduledTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

/// Time from now until `datetime`, or zero if it has passed.
fn until(datetime: DateTime<Utc>) -> Duration {
    (datetime - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Duration as ChronoDuration;

    use super::*;

    #[rocket::async_test]
    async fn runs_at_its_time() {
        let task = ScheduledTask::new(async { 7 }, Utc::now() + ChronoDuration::milliseconds(20));
        assert_eq!(task.await.unwrap(), 7);

        let overdue = ScheduledTask::new(async { 8 }, Utc::now() - ChronoDuration::hours(1));
        assert_eq!(overdue.await.unwrap(), 8);
    }

    #[rocket::async_test]
    async fn trigger_early() {
        let task = ScheduledTask::new(async { 9 }, Utc::now() + ChronoDuration::days(1));
        task.trigger_now();
        let result = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert_eq!(result.unwrap().unwrap(), 9);
    }

    #[rocket::async_test]
    async fn cancelled_tasks_never_run() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let task = ScheduledTask::new(
            async move { flag.store(true, Ordering::SeqCst) },
            Utc::now() + ChronoDuration::milliseconds(50),
        );
        assert!(!task.cancel().await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }
}
