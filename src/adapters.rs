//! Local collaborators for running the engine standalone.
//!
//! Files come from a directory snapshot; analysis results, subjects and
//! notifications are kept in memory and logged.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use jobhive_queue::handlers::{
    AnalysisRecord, AnalysisRepository, AnalysisService, ContentExtractor, ExtractionOutcome,
    FileRepository, Notifier, StoredFile, SubjectAssignment, SubjectDetector,
};
use jobhive_queue::payload::optional_str;
use jobhive_queue::{Payload, QueueError, QueueResult};

/// File repository held in memory.
#[derive(Default)]
pub(crate) struct MemoryFileRepository {
    files: RwLock<HashMap<i64, StoredFile>>,
    extractions: RwLock<HashMap<i64, ExtractionOutcome>>,
    subjects: RwLock<HashMap<i64, SubjectAssignment>>,
}

impl MemoryFileRepository {
    /// Load every regular file in `dir`, numbered from 1 in name order.
    pub(crate) async fn from_dir(dir: &Path) -> QueueResult<Self> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let repo = Self::default();
        for (index, path) in paths.into_iter().enumerate() {
            let id = index as i64 + 1;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let bytes = tokio::fs::read(&path).await?;
            info!(file_id = id, %file_name, bytes = bytes.len(), "Registered file");
            repo.insert(StoredFile {
                id,
                user_id: None,
                mime_type: mime_for(&file_name).to_string(),
                file_name,
                bytes,
            })
            .await;
        }
        Ok(repo)
    }

    pub(crate) async fn insert(&self, file: StoredFile) {
        self.files.write().await.insert(file.id, file);
    }

    pub(crate) async fn extraction(&self, file_id: i64) -> Option<ExtractionOutcome> {
        self.extractions.read().await.get(&file_id).cloned()
    }

    pub(crate) async fn subject(&self, file_id: i64) -> Option<SubjectAssignment> {
        self.subjects.read().await.get(&file_id).cloned()
    }
}

fn mime_for(file_name: &str) -> &'static str {
    match file_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "md" => "text/markdown",
        Some(ext) if ext == "json" => "application/json",
        Some(ext) if ext == "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl FileRepository for MemoryFileRepository {
    async fn fetch(&self, file_id: i64) -> QueueResult<StoredFile> {
        self.files
            .read()
            .await
            .get(&file_id)
            .cloned()
            .ok_or_else(|| QueueError::Collaborator(format!("file {} not found", file_id)))
    }

    async fn save_extraction(&self, file_id: i64, outcome: &ExtractionOutcome) -> QueueResult<()> {
        debug!(file_id, status = ?outcome.status, "Saving extraction");
        self.extractions.write().await.insert(file_id, outcome.clone());
        Ok(())
    }

    async fn save_subject(&self, file_id: i64, subject: &SubjectAssignment) -> QueueResult<()> {
        info!(file_id, subject = %subject.subject, topic = ?subject.topic, "Saving subject");
        self.subjects.write().await.insert(file_id, subject.clone());
        Ok(())
    }
}

/// Treats file bytes as UTF-8 text. Binary content fails extraction.
pub(crate) struct TextExtractor;

#[async_trait]
impl ContentExtractor for TextExtractor {
    async fn extract(&self, file: &StoredFile) -> QueueResult<ExtractionOutcome> {
        Ok(match std::str::from_utf8(&file.bytes) {
            Ok(text) => ExtractionOutcome::completed(text),
            Err(e) => ExtractionOutcome::failed(format!("{} is not text: {}", file.file_name, e)),
        })
    }
}

const SUBJECT_KEYWORDS: &[(&str, &[&str])] = &[
    ("biology", &["cell", "gene", "protein", "organism"]),
    ("chemistry", &["molecule", "reaction", "acid", "atom"]),
    ("mathematics", &["equation", "theorem", "integral", "matrix"]),
    ("physics", &["force", "energy", "velocity", "quantum"]),
];

/// Picks the subject whose keywords occur most often.
pub(crate) struct KeywordSubjectDetector;

#[async_trait]
impl SubjectDetector for KeywordSubjectDetector {
    async fn detect(&self, _file: &StoredFile, text: &str) -> QueueResult<SubjectAssignment> {
        let lowered = text.to_lowercase();
        let total_words = lowered.split_whitespace().count().max(1);

        let best = SUBJECT_KEYWORDS
            .iter()
            .map(|(subject, keywords)| {
                let (hits, topic) = keywords
                    .iter()
                    .map(|k| (lowered.matches(k).count(), *k))
                    .max_by_key(|(count, _)| *count)
                    .unwrap_or((0, ""));
                let total: usize = keywords.iter().map(|k| lowered.matches(k).count()).sum();
                (*subject, total, hits, topic)
            })
            .max_by_key(|(_, total, _, _)| *total);

        match best {
            Some((subject, total, hits, topic)) if total > 0 => Ok(SubjectAssignment {
                subject: subject.to_string(),
                topic: (hits > 0).then(|| topic.to_string()),
                confidence: (total as f32 / total_words as f32).min(1.0),
            }),
            _ => Ok(SubjectAssignment {
                subject: "general".to_string(),
                topic: None,
                confidence: 0.0,
            }),
        }
    }
}

/// Produces a summary from the stored extraction.
pub(crate) struct ExtractionSummaryService {
    files: std::sync::Arc<MemoryFileRepository>,
}

impl ExtractionSummaryService {
    pub(crate) fn new(files: std::sync::Arc<MemoryFileRepository>) -> Self {
        Self { files }
    }
}

#[async_trait]
impl AnalysisService for ExtractionSummaryService {
    async fn analyze(&self, file_id: i64, user_id: i64) -> QueueResult<AnalysisRecord> {
        let text = self
            .files
            .extraction(file_id)
            .await
            .and_then(|e| e.text)
            .ok_or_else(|| {
                QueueError::Collaborator(format!("file {} has no extracted text yet", file_id))
            })?;
        let subject = self.files.subject(file_id).await;

        let words = text.split_whitespace().count();
        let summary: String = text.split_whitespace().take(24).collect::<Vec<_>>().join(" ");
        Ok(AnalysisRecord {
            file_id,
            user_id,
            summary,
            details: serde_json::json!({
                "words": words,
                "subject": subject.map(|s| s.subject),
            }),
        })
    }
}

/// Keeps analysis records in memory.
#[derive(Default)]
pub(crate) struct MemoryAnalysisRepository {
    records: RwLock<Vec<AnalysisRecord>>,
}

impl MemoryAnalysisRepository {
    pub(crate) async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl AnalysisRepository for MemoryAnalysisRepository {
    async fn save(&self, record: &AnalysisRecord) -> QueueResult<()> {
        info!(
            file_id = record.file_id,
            user_id = record.user_id,
            summary = %record.summary,
            "Analysis stored"
        );
        self.records.write().await.push(record.clone());
        Ok(())
    }
}

/// Logs notifications instead of sending them.
pub(crate) struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, payload: &Payload) -> QueueResult<()> {
        let recipient = optional_str(payload, "to").unwrap_or("<unset>");
        let subject = optional_str(payload, "subject").unwrap_or_default();
        info!(%recipient, %subject, "Email notification");
        Ok(())
    }
}
