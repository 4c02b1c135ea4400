//! Background task processing: claim in the request, process detached.
//!
//! ```text
//! wrap(path, claim, process)
//!   ├─ claim    awaited by the caller; its error is returned as is
//!   └─ process  spawned; counted in processing_tasks_total{path},
//!               failures in processing_tasks_failure{path,errorCode},
//!               then a TaskDone is broadcast to subscribers
//! ```
//!
//! [`BackoffPolicy`] gives the delay before retrying a task that failed
//! `retry_count` times.

use crate::domain::config::TaskConfig;
use crate::domain::error::{ApiError, ApiResult};
use crate::middleware::metrics::TaskMetrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, Instrument};

/// Completion events buffered per subscriber
const DONE_CHANNEL_CAPACITY: usize = 64;

/// Exponential backoff capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    pub fn from_config(config: &TaskConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// `min(2^retry_count * initial, max)`
    pub fn backoff_time(&self, retry_count: u32) -> Duration {
        2u32.checked_pow(retry_count)
            .and_then(|factor| self.initial.checked_mul(factor))
            .map_or(self.max, |backoff| backoff.min(self.max))
    }
}

/// One task finished processing
#[derive(Debug, Clone)]
pub struct TaskDone {
    pub path: String,
    /// `None` when processing succeeded
    pub error: Option<ApiError>,
}

/// Runs task processing off the request path.
pub struct ProcessTaskWrapper {
    backoff: BackoffPolicy,
    metrics: Arc<TaskMetrics>,
    done: broadcast::Sender<TaskDone>,
}

impl ProcessTaskWrapper {
    pub fn new(backoff: BackoffPolicy, metrics: Arc<TaskMetrics>) -> Self {
        let (done, _) = broadcast::channel(DONE_CHANNEL_CAPACITY);
        Self {
            backoff,
            metrics,
            done,
        }
    }

    pub fn backoff_time(&self, retry_count: u32) -> Duration {
        self.backoff.backoff_time(retry_count)
    }

    /// Receive a [`TaskDone`] for every task processed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskDone> {
        self.done.subscribe()
    }

    /// Await `claim`, then spawn `process` and return its handle.
    ///
    /// A failed claim is returned to the caller and nothing is spawned.
    /// Processing failures are logged and counted, never returned.
    pub async fn wrap<C, P>(&self, path: &str, claim: C, process: P) -> ApiResult<JoinHandle<()>>
    where
        C: Future<Output = ApiResult<()>>,
        P: Future<Output = ApiResult<()>> + Send + 'static,
    {
        claim.await?;

        let path = path.to_string();
        let metrics = Arc::clone(&self.metrics);
        let done = self.done.clone();
        let span = info_span!("process_task", path = %path);

        Ok(tokio::spawn(
            async move {
                metrics.record_task(&path);

                let error = match process.await {
                    Ok(()) => {
                        debug!("Task processed");
                        None
                    }
                    Err(e) => {
                        error!(status = e.status.as_u16(), error = %e.message, "Task processing failed");
                        metrics.record_failure(&path, e.status.as_u16());
                        Some(e)
                    }
                };

                // Nobody listening is fine
                let _ = done.send(TaskDone { path, error });
            }
            .instrument(span),
        ))
    }
}
