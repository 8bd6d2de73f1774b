//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// Job engine configuration (`[engine]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Number of job handlers allowed to run at the same time.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Scheduler tick period.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Total attempts a job gets before it is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay; retry `n` waits `base * 2^n`.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Upper bound for a single backoff delay.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Per-attempt handler timeout (0 = none).
    #[serde(default)]
    pub handler_timeout_secs: u64,

    /// Run a dispatch pass on enqueue and on job completion, not only on ticks.
    #[serde(default = "default_wake_on_enqueue")]
    pub wake_on_enqueue: bool,

    /// Directory for persisted dead-letter records (None = in memory).
    #[serde(default)]
    pub dead_letter_dir: Option<PathBuf>,

    /// Jobs kept by the in-memory dead-letter store before the oldest are evicted.
    #[serde(default = "default_dead_letter_capacity")]
    pub dead_letter_capacity: usize,

    /// Capacity of the engine event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            tick_interval_secs: default_tick_interval_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            handler_timeout_secs: 0,
            wake_on_enqueue: default_wake_on_enqueue(),
            dead_letter_dir: None,
            dead_letter_capacity: default_dead_letter_capacity(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    3
}

fn default_tick_interval_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    60
}

fn default_max_backoff_secs() -> u64 {
    3600
}

fn default_wake_on_enqueue() -> bool {
    true
}

fn default_dead_letter_capacity() -> usize {
    1000
}

fn default_event_capacity() -> usize {
    256
}

/// Logging configuration (`[logging]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Fallback filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit console logs as JSON.
    #[serde(default)]
    pub json: bool,

    /// Directory for daily rolling log files.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            log_dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
