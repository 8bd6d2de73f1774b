//! Interfaces to the services the built-in handlers call.
//!
//! Storage, extraction, classification, AI and mail live outside the engine;
//! handlers only see these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QueueResult;
use crate::job::Payload;

/// A stored upload as the file repository returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: i64,
    pub user_id: Option<i64>,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Extraction status persisted alongside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Processing,
    Completed,
    Failed,
}

/// What content extraction produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub status: ExtractionStatus,
    pub text: Option<String>,
    pub error: Option<String>,
}

impl ExtractionOutcome {
    pub fn completed(text: impl Into<String>) -> Self {
        Self {
            status: ExtractionStatus::Completed,
            text: Some(text.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ExtractionStatus::Failed,
            text: None,
            error: Some(error.into()),
        }
    }
}

/// Subject and topic detected for a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAssignment {
    pub subject: String,
    pub topic: Option<String>,
    pub confidence: f32,
}

/// Result of an AI analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub file_id: i64,
    pub user_id: i64,
    pub summary: String,
    pub details: serde_json::Value,
}

/// File metadata and content storage.
#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn fetch(&self, file_id: i64) -> QueueResult<StoredFile>;

    async fn save_extraction(&self, file_id: i64, outcome: &ExtractionOutcome) -> QueueResult<()>;

    async fn save_subject(&self, file_id: i64, subject: &SubjectAssignment) -> QueueResult<()>;
}

/// Turns a stored file into text.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, file: &StoredFile) -> QueueResult<ExtractionOutcome>;
}

/// Classifies extracted text by subject and topic.
#[async_trait]
pub trait SubjectDetector: Send + Sync {
    async fn detect(&self, file: &StoredFile, text: &str) -> QueueResult<SubjectAssignment>;
}

/// Runs AI analysis of a file on behalf of a user.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, file_id: i64, user_id: i64) -> QueueResult<AnalysisRecord>;
}

/// Persists analysis results.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    async fn save(&self, record: &AnalysisRecord) -> QueueResult<()>;
}

/// Delivers notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &Payload) -> QueueResult<()>;
}

/// Notifier that accepts everything and sends nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _payload: &Payload) -> QueueResult<()> {
        Ok(())
    }
}
