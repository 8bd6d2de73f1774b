//! Job record, job types and status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;

/// Loosely-typed job payload. Handlers validate the fields they need.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Kinds of work the engine knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Fetch a file, extract its content and detect its subject.
    FileProcessing,
    /// Run AI analysis over a file for a user.
    AiAnalysis,
    /// Send a notification.
    EmailNotification,
}

impl JobType {
    /// All known job types.
    pub const ALL: [JobType; 3] = [
        JobType::FileProcessing,
        JobType::AiAnalysis,
        JobType::EmailNotification,
    ];

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FileProcessing => "file_processing",
            JobType::AiAnalysis => "ai_analysis",
            JobType::EmailNotification => "email_notification",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file_processing" | "FileProcessing" => Ok(JobType::FileProcessing),
            "ai_analysis" | "AIAnalysis" | "AiAnalysis" => Ok(JobType::AiAnalysis),
            "email_notification" | "EmailNotification" => Ok(JobType::EmailNotification),
            other => Err(QueueError::UnknownJobType(other.to_string())),
        }
    }
}

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue (first attempt or retry).
    #[default]
    Pending,
    /// Handler is running.
    Processing,
    /// Handler succeeded.
    Completed,
    /// Abandoned: unroutable or retry budget exhausted.
    Failed,
}

impl JobStatus {
    /// Completed and Failed are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A job moving through the engine.
///
/// `id` and `created_at` are fixed at creation; status, retry count and
/// schedule only change through the transition methods below, which the
/// dispatcher and retry policy drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    id: Uuid,
    job_type: JobType,
    payload: Payload,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    scheduled_for: DateTime<Utc>,
    retry_count: u32,
    status: JobStatus,
    last_error: Option<String>,
}

impl JobRecord {
    /// Create a pending job, eligible immediately.
    pub fn new(job_type: JobType, payload: Payload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type,
            payload,
            created_at: now,
            updated_at: now,
            scheduled_for: now,
            retry_count: 0,
            status: JobStatus::Pending,
            last_error: None,
        }
    }

    /// Delay the first attempt until `at`.
    pub fn with_scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = at;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn scheduled_for(&self) -> DateTime<Utc> {
        self.scheduled_for
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether the job may be dequeued at `now`.
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_for <= now
    }

    pub(crate) fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.updated_at = Utc::now();
    }

    pub(crate) fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.last_error = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Record a failed attempt and put the job back to Pending until `at`.
    pub(crate) fn schedule_retry(&mut self, at: DateTime<Utc>, error: impl Into<String>) {
        self.retry_count += 1;
        self.scheduled_for = at;
        self.status = JobStatus::Pending;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }
}
