//! Engine events and counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::job::{JobRecord, JobType};

/// Event emitted by the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Scheduler loop started.
    SchedulerStarted,
    /// Scheduler loop stopped.
    SchedulerStopped,
    /// A producer enqueued a job.
    JobEnqueued { job_id: Uuid, job_type: JobType },
    /// A handler attempt started. `attempt` is 1-based.
    JobStarted {
        job_id: Uuid,
        job_type: JobType,
        attempt: u32,
    },
    /// A job completed.
    JobCompleted { job: JobRecord },
    /// A failed attempt was re-enqueued.
    JobRetryScheduled { job: JobRecord, delay: Duration },
    /// A job was abandoned.
    JobFailed { job: JobRecord, reason: String },
}

/// Point-in-time engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub enqueued: u64,
    pub started: u64,
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
    pub in_flight: u64,
    pub available_permits: usize,
    pub queued: usize,
}

/// Shared atomic counters behind [`EngineStats`].
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub enqueued: AtomicU64,
    pub started: AtomicU64,
    pub completed: AtomicU64,
    pub retried: AtomicU64,
    pub failed: AtomicU64,
    pub in_flight: AtomicU64,
}

impl Counters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decr(counter: &AtomicU64) {
        counter.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self, available_permits: usize, queued: usize) -> EngineStats {
        EngineStats {
            enqueued: self.enqueued.load(Ordering::SeqCst),
            started: self.started.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            retried: self.retried.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            available_permits,
            queued,
        }
    }
}
