//! Retry policy with exponential backoff.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::job::JobRecord;
use crate::queue::JobQueue;

/// Decides whether a failed job is retried, and when.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    max_delay: Duration,
}

/// Result of applying the policy to a failed job.
#[derive(Debug)]
pub enum RetryOutcome {
    /// The job was re-enqueued as Pending.
    Retried { job: JobRecord, delay: Duration },
    /// The budget is spent; the job is Failed and was not re-enqueued.
    Exhausted(JobRecord),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60), Duration::from_secs(3600))
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` counts the first attempt.
    pub fn new(max_attempts: u32, base: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry `n`: `base * 2^n`, capped.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether a job that just failed with `retry_count` prior retries gets another attempt.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count + 1 < self.max_attempts
    }

    /// Apply the policy at the current time.
    pub fn on_failure(&self, job: JobRecord, error: &str, queue: &JobQueue) -> RetryOutcome {
        self.on_failure_at(job, error, queue, Utc::now())
    }

    /// Apply the policy as of `now`: re-enqueue with backoff or mark Failed.
    pub fn on_failure_at(
        &self,
        mut job: JobRecord,
        error: &str,
        queue: &JobQueue,
        now: DateTime<Utc>,
    ) -> RetryOutcome {
        if self.should_retry(job.retry_count()) {
            let delay = self.backoff(job.retry_count() + 1);
            let at = chrono::Duration::from_std(delay)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            job.schedule_retry(at, error);
            debug!(
                job_id = %job.id(),
                job_type = %job.job_type(),
                retry_count = job.retry_count(),
                delay_secs = delay.as_secs(),
                "Re-enqueueing job with backoff"
            );
            queue.enqueue(job.clone());
            RetryOutcome::Retried { job, delay }
        } else {
            job.mark_failed(error);
            error!(
                job_id = %job.id(),
                job_type = %job.job_type(),
                retry_count = job.retry_count(),
                attempts = job.retry_count() + 1,
                created_at = %job.created_at().to_rfc3339(),
                %error,
                "Job exhausted its retry budget, dropping"
            );
            RetryOutcome::Exhausted(job)
        }
    }
}
