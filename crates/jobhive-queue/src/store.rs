//! Dead-letter storage for abandoned jobs.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};
use crate::job::JobRecord;

/// Where jobs that end in Failed are recorded for operators to inspect.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Record an abandoned job.
    async fn record(&self, job: &JobRecord) -> QueueResult<()>;

    /// All recorded jobs, oldest first.
    async fn list(&self) -> QueueResult<Vec<JobRecord>>;

    /// Load one recorded job.
    async fn load(&self, id: &Uuid) -> QueueResult<Option<JobRecord>>;
}

/// Records kept by [`MemoryDeadLetterStore::new`].
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 1000;

#[derive(Default)]
struct MemoryDeadLetters {
    order: VecDeque<Uuid>,
    jobs: HashMap<Uuid, JobRecord>,
}

/// In-memory dead-letter store holding at most `capacity` jobs.
///
/// When full, recording a new job evicts the oldest one. Recording a job
/// that is already present replaces it in place.
pub struct MemoryDeadLetterStore {
    capacity: usize,
    inner: RwLock<MemoryDeadLetters>,
}

impl MemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DEAD_LETTER_CAPACITY)
    }

    /// Create a store bounded to `capacity` jobs (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(MemoryDeadLetters::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MemoryDeadLetterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeadLetterStore for MemoryDeadLetterStore {
    async fn record(&self, job: &JobRecord) -> QueueResult<()> {
        let mut inner = self.inner.write().await;
        if inner.jobs.insert(job.id(), job.clone()).is_some() {
            return Ok(());
        }
        inner.order.push_back(job.id());
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.jobs.remove(&evicted);
                debug!(job_id = %evicted, capacity = self.capacity, "Evicted oldest dead-letter job");
            }
        }
        Ok(())
    }

    async fn list(&self) -> QueueResult<Vec<JobRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect())
    }

    async fn load(&self, id: &Uuid) -> QueueResult<Option<JobRecord>> {
        Ok(self.inner.read().await.jobs.get(id).cloned())
    }
}

/// File system dead-letter store.
///
/// Jobs are stored as individual JSON files:
/// ```text
/// {storage_path}/
/// └── dead_letter/
///     └── {uuid}.json
/// ```
pub struct FileDeadLetterStore {
    storage_path: PathBuf,
}

impl FileDeadLetterStore {
    /// Create the store, creating its directory if needed.
    pub async fn new(storage_path: impl Into<PathBuf>) -> QueueResult<Self> {
        let storage_path = storage_path.into();
        let dir = storage_path.join("dead_letter");
        fs::create_dir_all(&dir).await.map_err(|e| {
            QueueError::Store(format!("Failed to create {:?}: {}", dir, e))
        })?;

        debug!("FileDeadLetterStore initialized at {:?}", storage_path);
        Ok(Self { storage_path })
    }

    fn dead_letter_dir(&self) -> PathBuf {
        self.storage_path.join("dead_letter")
    }

    fn job_path(&self, id: &Uuid) -> PathBuf {
        self.dead_letter_dir().join(format!("{}.json", id))
    }
}

#[async_trait]
impl DeadLetterStore for FileDeadLetterStore {
    async fn record(&self, job: &JobRecord) -> QueueResult<()> {
        let path = self.job_path(&job.id());
        let content = serde_json::to_string_pretty(job)?;
        fs::write(&path, content).await.map_err(|e| {
            QueueError::Store(format!("Failed to write {:?}: {}", path, e))
        })?;
        debug!("Recorded dead-letter job '{}' at {:?}", job.id(), path);
        Ok(())
    }

    async fn list(&self) -> QueueResult<Vec<JobRecord>> {
        let dir = self.dead_letter_dir();
        let mut jobs = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<JobRecord>(&content) {
                    Ok(job) => jobs.push(job),
                    Err(e) => warn!("Failed to deserialize job from {:?}: {}", path, e),
                },
                Err(e) => warn!("Failed to read job file {:?}: {}", path, e),
            }
        }

        jobs.sort_by_key(|j| j.updated_at());
        Ok(jobs)
    }

    async fn load(&self, id: &Uuid) -> QueueResult<Option<JobRecord>> {
        let path = self.job_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
