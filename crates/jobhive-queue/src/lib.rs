//! # JobHive Queue
//!
//! In-process background job engine.
//!
//! ## Features
//!
//! - FIFO queue with delayed eligibility
//! - Periodic scheduler bounded by a concurrency limit
//! - Retry with exponential backoff and a dead-letter store
//! - Built-in handlers for file processing, AI analysis and email notification
//! - Lifecycle events and counters

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod handler;
pub mod handlers;
pub mod job;
pub mod limiter;
pub mod payload;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod store;

pub use config::{EngineConfig, MIN_TICK_INTERVAL};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use engine::{Engine, EngineBuilder};
pub use error::{QueueError, QueueResult};
pub use events::{EngineEvent, EngineStats};
pub use handler::{FnHandler, HandlerRegistry, JobHandler};
pub use job::{JobRecord, JobStatus, JobType, Payload};
pub use limiter::{ConcurrencyLimiter, JobPermit};
pub use queue::JobQueue;
pub use retry::{RetryOutcome, RetryPolicy};
pub use scheduler::Scheduler;
pub use store::{
    DeadLetterStore, FileDeadLetterStore, MemoryDeadLetterStore, DEFAULT_DEAD_LETTER_CAPACITY,
};
