//! Task status polling.
//!
//! Polls `GET /tasks/{id}/status` until the task reaches a terminal state,
//! then fetches its records exactly once. The loop is bounded by attempt
//! count and optional wall-clock budget, and stops as soon as its
//! [`CancelToken`] fires.

use crate::client::api::{ApiError, TaskApi};
use crate::models::{Record, TaskStatus};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Bounds and pacing of the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay between status checks while the task is pending.
    pub interval: Duration,
    /// Maximum number of status checks (`None` = unbounded).
    pub max_attempts: Option<u32>,
    /// Maximum wall-clock time spent polling.
    pub max_duration: Option<Duration>,
    /// Consecutive transient failures tolerated before giving up.
    pub max_consecutive_errors: u32,
    /// Upper bound for the backoff delay after failures.
    pub max_backoff: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_attempts: Some(150),
            max_duration: None,
            max_consecutive_errors: 3,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    /// Delay before the next check after `failures` consecutive errors.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.min(16));
        self.interval.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Why polling ended without records.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("task {0} failed on the backend")]
    TaskFailed(String),

    #[error("task {0} is unknown to the backend")]
    NotFound(String),

    #[error("task did not finish after {attempts} status checks")]
    Exhausted { attempts: u32 },

    #[error("task did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("polling was cancelled")]
    Cancelled,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Progress notifications emitted while polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// A status check answered.
    Status { attempt: u32, status: TaskStatus },
    /// A status check failed and will be retried after `delay`.
    Retrying { attempt: u32, delay: Duration },
}

/// Owning side of a cancellation signal.
///
/// Cancels its tokens when [`cancel`](CancelSource::cancel) is called or
/// when it is dropped.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// A token observing this source.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observing side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the source cancels or goes away.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Polls one task against a [`TaskApi`].
pub struct Poller<A: ?Sized> {
    api: Arc<A>,
    policy: PollPolicy,
}

impl<A: TaskApi + ?Sized> Poller<A> {
    pub fn new(api: Arc<A>, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    /// Poll `task_id` until it completes, fails, runs out of budget or is
    /// cancelled. On completion the records are fetched exactly once.
    pub async fn poll<F>(
        &self,
        task_id: &str,
        cancel: &CancelToken,
        mut observe: F,
    ) -> Result<Vec<Record>, PollError>
    where
        F: FnMut(PollEvent),
    {
        let started = Instant::now();
        let deadline = self.policy.max_duration.map(|d| started + d);
        let mut attempts: u32 = 0;
        let mut failures: u32 = 0;

        info!("Polling task {}", task_id);

        loop {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }
            attempts += 1;

            let checked = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                _ = until(deadline) => return Err(self.deadline_exceeded(task_id)),
                result = self.api.task_status(task_id) => result,
            };

            let delay = match checked {
                Ok(status) => {
                    failures = 0;
                    debug!("Task {} status check {}: {}", task_id, attempts, status);
                    observe(PollEvent::Status {
                        attempt: attempts,
                        status,
                    });

                    match status {
                        TaskStatus::Completed => {
                            let records = tokio::select! {
                                biased;
                                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                                _ = until(deadline) => return Err(self.deadline_exceeded(task_id)),
                                result = self.api.task_records(task_id) => result?,
                            };
                            info!(
                                "Task {} completed after {} checks with {} records",
                                task_id,
                                attempts,
                                records.len()
                            );
                            return Ok(records);
                        }
                        TaskStatus::Failed => {
                            warn!("Task {} reported failure", task_id);
                            return Err(PollError::TaskFailed(task_id.to_string()));
                        }
                        TaskStatus::NotFound => {
                            return Err(PollError::NotFound(task_id.to_string()));
                        }
                        TaskStatus::Pending | TaskStatus::InProgress | TaskStatus::Unknown => {
                            self.policy.interval
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    if !e.is_transient() || failures >= self.policy.max_consecutive_errors {
                        warn!("Giving up on task {} after error: {}", task_id, e);
                        return Err(PollError::Api(e));
                    }
                    let delay = self.policy.backoff(failures);
                    warn!(
                        "Status check {} for task {} failed ({}), retrying in {:?}",
                        attempts, task_id, e, delay
                    );
                    observe(PollEvent::Retrying {
                        attempt: attempts,
                        delay,
                    });
                    delay
                }
            };

            if let Some(max) = self.policy.max_attempts {
                if attempts >= max {
                    warn!("Task {} still unfinished after {} checks", task_id, attempts);
                    return Err(PollError::Exhausted { attempts });
                }
            }
            if let Some(deadline) = deadline {
                if Instant::now() + delay > deadline {
                    return Err(self.deadline_exceeded(task_id));
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn deadline_exceeded(&self, task_id: &str) -> PollError {
        let budget = self.policy.max_duration.unwrap_or_default();
        warn!("Task {} still unfinished after {:?}", task_id, budget);
        PollError::DeadlineExceeded(budget)
    }
}

/// Resolves at `deadline`, or never when there is none.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// A poll running on its own tokio task.
///
/// Dropping the handle cancels the poll, so pending retries never outlive
/// their consumer.
pub struct PollHandle {
    cancel: CancelSource,
    join: Option<JoinHandle<Result<Vec<Record>, PollError>>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the poll to finish.
    pub async fn join(mut self) -> Result<Vec<Record>, PollError> {
        let Some(join) = self.join.take() else {
            return Err(PollError::Cancelled);
        };
        match join.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(PollError::Cancelled),
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn `poller` for `task_id` on the current runtime.
pub fn spawn_poll<A, F>(poller: Poller<A>, task_id: String, observe: F) -> PollHandle
where
    A: TaskApi + ?Sized + 'static,
    F: FnMut(PollEvent) + Send + 'static,
{
    let cancel = CancelSource::new();
    let token = cancel.token();
    let join = tokio::spawn(async move { poller.poll(&task_id, &token, observe).await });

    PollHandle {
        cancel,
        join: Some(join),
    }
}
