//! JSON-lines job files.
//!
//! One job per line: `{"job_type": "file_processing", "payload": {"fileId": 1}}`.
//! Blank lines and lines starting with `#` are skipped.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use jobhive_queue::{JobType, Payload};

#[derive(Debug, Deserialize)]
struct JobLine {
    job_type: String,
    #[serde(default)]
    payload: Payload,
}

/// Parse job lines. Errors name the offending line.
pub(crate) fn parse_jobs(content: &str) -> Result<Vec<(JobType, Payload)>> {
    let mut jobs = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry: JobLine = serde_json::from_str(line)
            .with_context(|| format!("line {}: malformed job", index + 1))?;
        let job_type = entry
            .job_type
            .parse::<JobType>()
            .with_context(|| format!("line {}", index + 1))?;
        jobs.push((job_type, entry.payload));
    }
    Ok(jobs)
}

pub(crate) async fn read_jobs(path: &Path) -> Result<Vec<(JobType, Payload)>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading jobs file {}", path.display()))?;
    parse_jobs(&content)
}
