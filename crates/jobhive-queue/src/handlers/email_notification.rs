//! Email notification delivery.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::QueueResult;
use crate::handler::JobHandler;
use crate::handlers::collaborators::{NoopNotifier, Notifier};
use crate::job::{JobType, Payload};

/// Handler for [`JobType::EmailNotification`]. The payload goes to the notifier as is.
pub struct EmailNotificationHandler {
    notifier: Arc<dyn Notifier>,
}

impl EmailNotificationHandler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

impl Default for EmailNotificationHandler {
    fn default() -> Self {
        Self::new(Arc::new(NoopNotifier))
    }
}

#[async_trait]
impl JobHandler for EmailNotificationHandler {
    fn job_type(&self) -> JobType {
        JobType::EmailNotification
    }

    async fn handle(&self, payload: &Payload) -> QueueResult<()> {
        self.notifier.notify(payload).await?;
        debug!(fields = payload.len(), "Notification delivered");
        Ok(())
    }
}
