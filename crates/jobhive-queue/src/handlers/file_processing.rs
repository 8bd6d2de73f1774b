//! File ingestion: fetch, extract, persist, then detect subject.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::handler::JobHandler;
use crate::handlers::collaborators::{
    ContentExtractor, ExtractionOutcome, ExtractionStatus, FileRepository, StoredFile,
    SubjectDetector,
};
use crate::job::{JobType, Payload};
use crate::payload::require_i64;

/// Handler for [`JobType::FileProcessing`]. Payload: `{ fileId }`.
///
/// A failure in subject detection is logged and swallowed once extraction
/// has been persisted; only fetch and extraction failures fail the attempt.
pub struct FileProcessingHandler {
    files: Arc<dyn FileRepository>,
    extractor: Arc<dyn ContentExtractor>,
    detector: Arc<dyn SubjectDetector>,
}

impl FileProcessingHandler {
    pub fn new(
        files: Arc<dyn FileRepository>,
        extractor: Arc<dyn ContentExtractor>,
        detector: Arc<dyn SubjectDetector>,
    ) -> Self {
        Self {
            files,
            extractor,
            detector,
        }
    }

    async fn persist_failure(&self, file_id: i64, error: &QueueError) {
        let outcome = ExtractionOutcome::failed(error.to_string());
        if let Err(e) = self.files.save_extraction(file_id, &outcome).await {
            warn!(file_id, error = %e, "Failed to persist extraction failure");
        }
    }

    async fn detect_subject(&self, file_id: i64, file: &StoredFile, text: &str) {
        let subject = match self.detector.detect(file, text).await {
            Ok(subject) => subject,
            Err(e) => {
                warn!(file_id, error = %e, "Subject detection failed, keeping extraction result");
                return;
            }
        };
        match self.files.save_subject(file_id, &subject).await {
            Ok(()) => debug!(file_id, subject = %subject.subject, "Saved detected subject"),
            Err(e) => warn!(file_id, error = %e, "Failed to save detected subject"),
        }
    }
}

#[async_trait]
impl JobHandler for FileProcessingHandler {
    fn job_type(&self) -> JobType {
        JobType::FileProcessing
    }

    async fn handle(&self, payload: &Payload) -> QueueResult<()> {
        let file_id = require_i64(payload, "fileId")?;
        let file = self.files.fetch(file_id).await?;

        let outcome = match self.extractor.extract(&file).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.persist_failure(file_id, &e).await;
                return Err(e);
            }
        };

        self.files.save_extraction(file_id, &outcome).await?;

        if outcome.status == ExtractionStatus::Failed {
            let reason = outcome
                .error
                .unwrap_or_else(|| "extraction failed".to_string());
            return Err(QueueError::Collaborator(reason));
        }

        info!(
            file_id,
            file_name = %file.file_name,
            chars = outcome.text.as_deref().map_or(0, str::len),
            "Extracted file content"
        );

        match outcome.text.as_deref() {
            Some(text) if !text.trim().is_empty() => self.detect_subject(file_id, &file, text).await,
            _ => debug!(file_id, "No text extracted, skipping subject detection"),
        }

        Ok(())
    }
}
