//! AI analysis of an uploaded file.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::QueueResult;
use crate::handler::JobHandler;
use crate::handlers::collaborators::{AnalysisRepository, AnalysisService};
use crate::job::{JobType, Payload};
use crate::payload::require_i64;

/// Handler for [`JobType::AiAnalysis`]. Payload: `{ fileId, userId }`.
pub struct AiAnalysisHandler {
    service: Arc<dyn AnalysisService>,
    repository: Arc<dyn AnalysisRepository>,
}

impl AiAnalysisHandler {
    pub fn new(service: Arc<dyn AnalysisService>, repository: Arc<dyn AnalysisRepository>) -> Self {
        Self {
            service,
            repository,
        }
    }
}

#[async_trait]
impl JobHandler for AiAnalysisHandler {
    fn job_type(&self) -> JobType {
        JobType::AiAnalysis
    }

    async fn handle(&self, payload: &Payload) -> QueueResult<()> {
        let file_id = require_i64(payload, "fileId")?;
        let user_id = require_i64(payload, "userId")?;

        let record = self.service.analyze(file_id, user_id).await?;
        self.repository.save(&record).await?;

        info!(file_id, user_id, "Stored AI analysis");
        Ok(())
    }
}
