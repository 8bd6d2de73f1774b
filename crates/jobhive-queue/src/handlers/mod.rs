//! Built-in handlers for the three job types.

pub mod collaborators;

mod ai_analysis;
mod email_notification;
mod file_processing;

pub use ai_analysis::AiAnalysisHandler;
pub use collaborators::{
    AnalysisRecord, AnalysisRepository, AnalysisService, ContentExtractor, ExtractionOutcome,
    ExtractionStatus, FileRepository, NoopNotifier, Notifier, StoredFile, SubjectAssignment,
    SubjectDetector,
};
pub use email_notification::EmailNotificationHandler;
pub use file_processing::FileProcessingHandler;
