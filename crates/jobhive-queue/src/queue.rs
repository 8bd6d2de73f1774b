//! FIFO job queue with eligibility gating.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::job::JobRecord;

/// Unbounded, thread-safe FIFO of pending jobs.
///
/// Dequeue returns the earliest-enqueued job whose `scheduled_for` has
/// passed; jobs still waiting out a delay are skipped, not blocking the ones
/// behind them. The lock is only held for the in-memory scan.
#[derive(Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<JobRecord>>,
}

impl JobQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job. Never blocks on anything slower than the queue lock.
    pub fn enqueue(&self, job: JobRecord) {
        debug!(
            job_id = %job.id(),
            job_type = %job.job_type(),
            scheduled_for = %job.scheduled_for().to_rfc3339(),
            "Enqueueing job"
        );
        self.jobs.lock().push_back(job);
    }

    /// Remove and return the oldest job eligible now.
    pub fn try_dequeue(&self) -> Option<JobRecord> {
        self.try_dequeue_at(Utc::now())
    }

    /// Remove and return the oldest job eligible at `now`.
    pub fn try_dequeue_at(&self, now: DateTime<Utc>) -> Option<JobRecord> {
        let mut jobs = self.jobs.lock();
        let index = jobs.iter().position(|job| job.is_eligible_at(now))?;
        let job = jobs.remove(index)?;
        debug!(job_id = %job.id(), skipped = index, "Dequeued job");
        Some(job)
    }

    /// Number of queued jobs, eligible or not.
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Whether any job is eligible at `now`.
    pub fn has_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.jobs.lock().iter().any(|job| job.is_eligible_at(now))
    }

    /// Number of jobs eligible at `now`.
    pub fn eligible_len_at(&self, now: DateTime<Utc>) -> usize {
        self.jobs.lock().iter().filter(|job| job.is_eligible_at(now)).count()
    }

    /// Earliest `scheduled_for` among queued jobs.
    pub fn next_scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.jobs.lock().iter().map(JobRecord::scheduled_for).min()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
