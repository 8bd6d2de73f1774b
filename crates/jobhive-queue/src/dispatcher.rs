//! Routes dequeued jobs to their handlers and settles the outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Notify};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::events::{Counters, EngineEvent};
use crate::handler::HandlerRegistry;
use crate::job::{JobRecord, JobType};
use crate::limiter::JobPermit;
use crate::queue::JobQueue;
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::store::DeadLetterStore;

/// How a dispatched job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handler succeeded.
    Completed,
    /// Handler failed and the job was re-enqueued.
    Retried,
    /// Retry budget exhausted.
    Exhausted,
    /// No handler registered for the job type.
    Unroutable,
}

/// Failure boundary around handler execution.
///
/// Each attempt runs on its own task so errors, panics and timeouts all come
/// back here as values. The permit passed in is released only after the
/// success or retry bookkeeping is done and the handler task has ended; a
/// timeout fails the attempt early but does not cancel the task.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    queue: Arc<JobQueue>,
    retry: RetryPolicy,
    dead_letters: Arc<dyn DeadLetterStore>,
    handler_timeout: Option<Duration>,
    events: broadcast::Sender<EngineEvent>,
    counters: Arc<Counters>,
    wake: Arc<Notify>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        registry: Arc<HandlerRegistry>,
        queue: Arc<JobQueue>,
        retry: RetryPolicy,
        dead_letters: Arc<dyn DeadLetterStore>,
        handler_timeout: Option<Duration>,
        events: broadcast::Sender<EngineEvent>,
        counters: Arc<Counters>,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            registry,
            queue,
            retry,
            dead_letters,
            handler_timeout,
            events,
            counters,
            wake,
        }
    }

    /// Run one attempt of `job` while holding `permit`.
    pub async fn dispatch(&self, mut job: JobRecord, permit: JobPermit) -> DispatchOutcome {
        job.mark_processing();
        let job_id = job.id();
        let job_type = job.job_type();

        let Some(handler) = self.registry.get(job_type) else {
            warn!(%job_id, %job_type, "No handler registered for job type");
            let reason = format!("No handler registered for job type: {}", job_type);
            self.abandon(job, reason).await;
            permit.release();
            self.wake.notify_one();
            return DispatchOutcome::Unroutable;
        };

        let attempt = job.retry_count() + 1;
        info!(%job_id, %job_type, attempt, "Processing job");
        Counters::incr(&self.counters.started);
        Counters::incr(&self.counters.in_flight);
        let _ = self.events.send(EngineEvent::JobStarted {
            job_id,
            job_type,
            attempt,
        });

        let start = Instant::now();
        let payload = job.payload().clone();
        let task = tokio::spawn(async move { handler.handle(&payload).await });
        let (result, overrun) = self.await_attempt(task, job_type).await;

        let outcome = match result {
            Ok(()) => {
                job.mark_completed();
                Counters::incr(&self.counters.completed);
                info!(
                    %job_id,
                    %job_type,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job completed successfully"
                );
                let _ = self.events.send(EngineEvent::JobCompleted { job });
                DispatchOutcome::Completed
            }
            Err(e) => {
                let reason = e.to_string();
                error!(
                    %job_id,
                    %job_type,
                    attempt,
                    error = %reason,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job attempt failed"
                );
                self.settle_failure(job, &reason).await
            }
        };

        // A timed-out handler keeps its permit until its task really ends.
        if let Some(task) = overrun {
            warn!(%job_id, %job_type, "Holding permit until timed-out handler returns");
            match task.await {
                Ok(late) => debug!(
                    %job_id,
                    succeeded = late.is_ok(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Timed-out handler returned"
                ),
                Err(e) => warn!(%job_id, error = %join_failure(e), "Timed-out handler ended abnormally"),
            }
        }

        Counters::decr(&self.counters.in_flight);
        permit.release();
        self.wake.notify_one();
        outcome
    }

    /// Wait for the handler task. On timeout the attempt fails but the task is
    /// handed back still running, so the caller can hold the permit until it ends.
    async fn await_attempt(
        &self,
        mut task: JoinHandle<QueueResult<()>>,
        job_type: JobType,
    ) -> (QueueResult<()>, Option<JoinHandle<QueueResult<()>>>) {
        let joined = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(%job_type, timeout_ms = limit.as_millis() as u64, "Job exceeded timeout");
                    return (Err(QueueError::Timeout(limit)), Some(task));
                }
            },
            None => task.await,
        };

        (joined.unwrap_or_else(|e| Err(join_failure(e))), None)
    }

    async fn settle_failure(&self, job: JobRecord, reason: &str) -> DispatchOutcome {
        match self.retry.on_failure(job, reason, &self.queue) {
            RetryOutcome::Retried { job, delay } => {
                Counters::incr(&self.counters.retried);
                let _ = self.events.send(EngineEvent::JobRetryScheduled { job, delay });
                DispatchOutcome::Retried
            }
            RetryOutcome::Exhausted(job) => {
                self.record_dead_letter(&job).await;
                Counters::incr(&self.counters.failed);
                let _ = self.events.send(EngineEvent::JobFailed {
                    job,
                    reason: reason.to_string(),
                });
                DispatchOutcome::Exhausted
            }
        }
    }

    async fn abandon(&self, mut job: JobRecord, reason: String) {
        job.mark_failed(reason.clone());
        self.record_dead_letter(&job).await;
        Counters::incr(&self.counters.failed);
        let _ = self.events.send(EngineEvent::JobFailed { job, reason });
    }

    async fn record_dead_letter(&self, job: &JobRecord) {
        match self.dead_letters.record(job).await {
            Ok(()) => debug!(job_id = %job.id(), "Recorded dead-letter job"),
            Err(e) => error!(job_id = %job.id(), error = %e, "Failed to record dead-letter job"),
        }
    }
}

/// Map a handler task that did not return into a queue error.
fn join_failure(err: JoinError) -> QueueError {
    if err.is_panic() {
        let panic = err.into_panic();
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        QueueError::HandlerPanicked(message)
    } else {
        QueueError::HandlerCancelled(err.to_string())
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
