//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use jobhive_config::EngineSection;

use crate::retry::RetryPolicy;

/// Shortest scheduler tick the engine accepts.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Runtime configuration for the job engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Permits in the concurrency limiter.
    pub max_concurrent_jobs: usize,
    /// Scheduler tick period.
    pub tick_interval: Duration,
    /// Total attempts per job.
    pub max_attempts: u32,
    /// Backoff base; retry `n` waits `base * 2^n`.
    pub backoff_base: Duration,
    /// Backoff cap.
    pub max_backoff: Duration,
    /// Per-attempt handler timeout.
    pub handler_timeout: Option<Duration>,
    /// Dispatch on enqueue and completion as well as on ticks.
    pub wake_on_enqueue: bool,
    /// Directory for persisted dead-letter records.
    pub dead_letter_dir: Option<PathBuf>,
    /// Jobs the in-memory dead-letter store keeps.
    pub dead_letter_capacity: usize,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&EngineSection::default())
    }
}

impl From<&EngineSection> for EngineConfig {
    fn from(section: &EngineSection) -> Self {
        Self {
            max_concurrent_jobs: section.max_concurrent_jobs.max(1),
            tick_interval: Duration::from_secs(section.tick_interval_secs.max(1)),
            max_attempts: section.max_attempts.max(1),
            backoff_base: Duration::from_secs(section.backoff_base_secs),
            max_backoff: Duration::from_secs(section.max_backoff_secs),
            handler_timeout: (section.handler_timeout_secs > 0)
                .then(|| Duration::from_secs(section.handler_timeout_secs)),
            wake_on_enqueue: section.wake_on_enqueue,
            dead_letter_dir: section.dead_letter_dir.clone(),
            dead_letter_capacity: section.dead_letter_capacity.max(1),
            event_capacity: section.event_capacity.max(1),
        }
    }
}

impl EngineConfig {
    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    /// Set the scheduler tick period. Zero is raised to [`MIN_TICK_INTERVAL`].
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(MIN_TICK_INTERVAL);
        self
    }

    /// Set the attempt budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the backoff base and cap.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.max_backoff = max;
        self
    }

    /// Set a per-attempt handler timeout.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Enable or disable dispatch wake-ups between ticks.
    pub fn with_wake_on_enqueue(mut self, enabled: bool) -> Self {
        self.wake_on_enqueue = enabled;
        self
    }

    /// Bound the in-memory dead-letter store.
    pub fn with_dead_letter_capacity(mut self, capacity: usize) -> Self {
        self.dead_letter_capacity = capacity.max(1);
        self
    }

    /// Retry policy derived from this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.backoff_base, self.max_backoff)
    }
}
