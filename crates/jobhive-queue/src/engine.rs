//! Engine facade: producer API and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::error::QueueResult;
use crate::events::{Counters, EngineEvent, EngineStats};
use crate::handler::{HandlerRegistry, JobHandler};
use crate::job::{JobRecord, JobType, Payload};
use crate::limiter::ConcurrencyLimiter;
use crate::queue::JobQueue;
use crate::scheduler::Scheduler;
use crate::store::{DeadLetterStore, MemoryDeadLetterStore};

/// Background job engine.
///
/// Owns the queue, limiter, dispatcher and scheduler. Several engines can
/// live in one process; nothing here is global.
pub struct Engine {
    config: EngineConfig,
    queue: Arc<JobQueue>,
    limiter: ConcurrencyLimiter,
    scheduler: Arc<Scheduler>,
    dead_letters: Arc<dyn DeadLetterStore>,
    events: broadcast::Sender<EngineEvent>,
    counters: Arc<Counters>,
    wake: Arc<Notify>,
}

impl Engine {
    /// Start building an engine.
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Enqueue a job and return its id. Does not wait on anything.
    pub fn enqueue(&self, job_type: JobType, payload: Payload) -> Uuid {
        self.enqueue_record(JobRecord::new(job_type, payload))
    }

    /// Enqueue a prepared record (for example one with a delayed `scheduled_for`).
    pub fn enqueue_record(&self, job: JobRecord) -> Uuid {
        let job_id = job.id();
        let job_type = job.job_type();
        self.queue.enqueue(job);
        Counters::incr(&self.counters.enqueued);
        let _ = self.events.send(EngineEvent::JobEnqueued { job_id, job_type });
        if self.config.wake_on_enqueue {
            self.wake.notify_one();
        }
        job_id
    }

    /// Begin ticking.
    pub fn start(&self) -> QueueResult<()> {
        self.scheduler.start()
    }

    /// Cancel the timer. Jobs already dispatched run to completion.
    pub async fn stop(&self) -> QueueResult<()> {
        self.scheduler.stop().await
    }

    /// Wait up to `timeout` for in-flight jobs to settle.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.scheduler.drain(timeout).await
    }

    /// Run one dispatch pass now, outside the timer.
    pub fn dispatch_now(&self) -> usize {
        self.scheduler.dispatch_pass()
    }

    /// Wait for a free permit, then dispatch one eligible job if there is one.
    pub async fn dispatch_when_ready(&self) -> QueueResult<bool> {
        self.scheduler.dispatch_when_ready().await
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> EngineStats {
        self.counters.snapshot(self.limiter.available(), self.queue.len())
    }

    /// Abandoned jobs recorded so far.
    pub fn dead_letters(&self) -> Arc<dyn DeadLetterStore> {
        self.dead_letters.clone()
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    registry: HandlerRegistry,
    dead_letters: Option<Arc<dyn DeadLetterStore>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::new(),
            dead_letters: None,
        }
    }

    /// Register a handler.
    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.registry.register(handler);
        self
    }

    /// Register a shared handler.
    pub fn with_shared_handler(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.registry.register_arc(handler);
        self
    }

    /// Use a specific dead-letter store (default: in memory, bounded by `dead_letter_capacity`).
    pub fn with_dead_letter_store(mut self, store: Arc<dyn DeadLetterStore>) -> Self {
        self.dead_letters = Some(store);
        self
    }

    /// Build the engine. Call [`Engine::start`] to begin dispatching.
    pub fn build(self) -> Engine {
        let config = self.config;
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let queue = Arc::new(JobQueue::new());
        let limiter = ConcurrencyLimiter::new(config.max_concurrent_jobs);
        let counters = Arc::new(Counters::default());
        let wake = Arc::new(Notify::new());
        let dead_letters = self
            .dead_letters
            .unwrap_or_else(|| {
                Arc::new(MemoryDeadLetterStore::with_capacity(config.dead_letter_capacity))
            });

        debug!(handlers = ?self.registry.job_types(), "Building job engine");

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(self.registry),
            queue.clone(),
            config.retry_policy(),
            dead_letters.clone(),
            config.handler_timeout,
            events.clone(),
            counters.clone(),
            wake.clone(),
        ));

        let scheduler = Arc::new(Scheduler::new(
            queue.clone(),
            limiter.clone(),
            dispatcher,
            config.tick_interval,
            wake.clone(),
            config.wake_on_enqueue,
            events.clone(),
        ));

        info!(
            max_concurrent_jobs = config.max_concurrent_jobs,
            max_attempts = config.max_attempts,
            tick_interval_ms = config.tick_interval.as_millis() as u64,
            "Job engine built"
        );

        Engine {
            config,
            queue,
            limiter,
            scheduler,
            dead_letters,
            events,
            counters,
            wake,
        }
    }
}
