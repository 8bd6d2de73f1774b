//! Job handler contract and registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::QueueResult;
use crate::job::{JobType, Payload};

/// Performs the work for one job type.
///
/// Handlers only do the work. Retries, queueing and concurrency belong to
/// the dispatcher.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute one attempt.
    async fn handle(&self, payload: &Payload) -> QueueResult<()>;
}

type BoxedHandlerFn =
    Box<dyn Fn(Payload) -> Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> + Send + Sync>;

/// Handler backed by an async closure.
pub struct FnHandler {
    job_type: JobType,
    func: BoxedHandlerFn,
}

impl FnHandler {
    /// Wrap `func` as the handler for `job_type`.
    pub fn new<F, Fut>(job_type: JobType, func: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<()>> + Send + 'static,
    {
        Self {
            job_type,
            func: Box::new(move |payload| Box::pin(func(payload))),
        }
    }
}

#[async_trait]
impl JobHandler for FnHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn handle(&self, payload: &Payload) -> QueueResult<()> {
        (self.func)(payload.clone()).await
    }
}

/// Lookup table from job type to handler.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same type.
    pub fn register<H: JobHandler + 'static>(&mut self, handler: H) {
        self.register_arc(Arc::new(handler));
    }

    /// Register a shared handler.
    pub fn register_arc(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type();
        if self.handlers.insert(job_type, handler).is_some() {
            info!(%job_type, "Replaced job handler");
        } else {
            info!(%job_type, "Registered job handler");
        }
    }

    /// Handler for `job_type`, if any.
    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    /// Check if a handler is registered for `job_type`.
    pub fn contains(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    /// Registered job types.
    pub fn job_types(&self) -> Vec<JobType> {
        self.handlers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
