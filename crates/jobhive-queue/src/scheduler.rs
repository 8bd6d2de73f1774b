//! Periodic dispatch loop.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::MIN_TICK_INTERVAL;
use crate::dispatcher::Dispatcher;
use crate::error::{QueueError, QueueResult};
use crate::events::EngineEvent;
use crate::limiter::{ConcurrencyLimiter, JobPermit};
use crate::queue::JobQueue;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Fires dispatch passes on a fixed period, starting immediately.
///
/// A pass hands eligible jobs to the dispatcher while permits are free.
/// Jobs run on tracked tasks so a pass never waits for a handler.
pub struct Scheduler {
    queue: Arc<JobQueue>,
    limiter: ConcurrencyLimiter,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    wake: Arc<Notify>,
    wake_enabled: bool,
    tracker: TaskTracker,
    events: broadcast::Sender<EngineEvent>,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        queue: Arc<JobQueue>,
        limiter: ConcurrencyLimiter,
        dispatcher: Arc<Dispatcher>,
        interval: Duration,
        wake: Arc<Notify>,
        wake_enabled: bool,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            queue,
            limiter,
            dispatcher,
            interval: interval.max(MIN_TICK_INTERVAL),
            wake,
            wake_enabled,
            tracker: TaskTracker::new(),
            events,
            running: Mutex::new(None),
        }
    }

    /// Start ticking. Must be called inside a tokio runtime.
    pub fn start(self: &Arc<Self>) -> QueueResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(QueueError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let scheduler = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { scheduler.run(token).await });

        *running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Cancel the timer and wait for the loop to exit. In-flight jobs keep running.
    pub async fn stop(&self) -> QueueResult<()> {
        let running = self.running.lock().take();
        let Some(Running { cancel, handle }) = running else {
            return Err(QueueError::NotRunning);
        };
        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "Scheduler loop ended abnormally");
        }
        Ok(())
    }

    /// Check if the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Wait up to `timeout` for in-flight jobs. Returns whether all finished.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok();
        self.tracker.reopen();
        if !drained {
            warn!(in_flight = self.tracker.len(), "Drain timed out with jobs still running");
        }
        drained
    }

    /// Jobs currently dispatched and not yet settled.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            max_concurrent = self.limiter.max(),
            "Scheduler started"
        );
        let _ = self.events.send(EngineEvent::SchedulerStarted);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.wake.notified(), if self.wake_enabled => {}
            }
            self.dispatch_pass();
        }

        let _ = self.events.send(EngineEvent::SchedulerStopped);
        info!("Scheduler stopped");
    }

    /// Hand off every eligible job that a free permit allows. Never suspends.
    pub fn dispatch_pass(&self) -> usize {
        let mut dispatched = 0;
        while let Some(permit) = self.limiter.try_acquire() {
            if !self.spawn_next(permit) {
                break;
            }
            dispatched += 1;
        }
        if dispatched > 0 {
            debug!(dispatched, queued = self.queue.len(), "Dispatch pass");
        }
        dispatched
    }

    /// Wait for a permit, then dispatch one eligible job.
    ///
    /// Returns false, releasing the permit, when nothing is eligible.
    pub async fn dispatch_when_ready(&self) -> QueueResult<bool> {
        let permit = self.limiter.acquire().await?;
        Ok(self.spawn_next(permit))
    }

    fn spawn_next(&self, permit: JobPermit) -> bool {
        let Some(job) = self.queue.try_dequeue() else {
            permit.release();
            return false;
        };
        let dispatcher = self.dispatcher.clone();
        self.tracker.spawn(async move {
            dispatcher.dispatch(job, permit).await;
        });
        true
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
