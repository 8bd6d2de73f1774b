//! End-to-end behavior of the engine through its public API.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;

use async_trait::async_trait;
use jobhive_queue::handlers::{
    ContentExtractor, ExtractionOutcome, FileProcessingHandler, FileRepository, StoredFile,
    SubjectAssignment, SubjectDetector,
};
use jobhive_queue::{
    Engine, EngineConfig, EngineEvent, FnHandler, JobQueue, JobRecord, JobStatus, JobType,
    Payload, QueueError, RetryOutcome, RetryPolicy,
};

/// Tracks how many handlers run at once.
#[derive(Default)]
struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
    finished: AtomicUsize,
}

impl ConcurrencyProbe {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn probed_handler(job_type: JobType, probe: Arc<ConcurrencyProbe>) -> FnHandler {
    FnHandler::new(job_type, move |_| {
        let probe = probe.clone();
        async move {
            probe.enter();
            tokio::time::sleep(Duration::from_millis(200)).await;
            probe.exit();
            Ok(())
        }
    })
}

fn file_payload(file_id: i64) -> Payload {
    let mut payload = Payload::new();
    payload.insert("fileId".to_string(), json!(file_id));
    payload
}

async fn collect_settled(rx: &mut broadcast::Receiver<EngineEvent>, n: usize) -> Vec<EngineEvent> {
    let mut settled = Vec::new();
    while settled.len() < n {
        match rx.recv().await.unwrap() {
            event @ (EngineEvent::JobCompleted { .. }
            | EngineEvent::JobFailed { .. }
            | EngineEvent::JobRetryScheduled { .. }) => settled.push(event),
            _ => {}
        }
    }
    settled
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_never_exceeds_limit() {
    let probe = Arc::new(ConcurrencyProbe::default());
    let engine = Engine::builder(EngineConfig::default().with_max_concurrent(3))
        .with_handler(probed_handler(JobType::FileProcessing, probe.clone()))
        .build();
    let mut events = engine.subscribe();

    for id in 1..=5 {
        engine.enqueue(JobType::FileProcessing, file_payload(id));
    }
    engine.start().unwrap();

    let settled = collect_settled(&mut events, 5).await;
    assert!(settled
        .iter()
        .all(|e| matches!(e, EngineEvent::JobCompleted { .. })));
    assert_eq!(probe.finished.load(Ordering::SeqCst), 5);
    assert!(probe.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(probe.peak.load(Ordering::SeqCst), 3);

    engine.stop().await.unwrap();
    assert!(engine.drain(Duration::from_secs(1)).await);

    let stats = engine.stats();
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.available_permits, 3);
    assert_eq!(stats.queued, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_blocking_work_keeps_its_permit() {
    let probe = Arc::new(ConcurrencyProbe::default());
    let work = probe.clone();
    let handler = FnHandler::new(JobType::FileProcessing, move |_| {
        let work = work.clone();
        async move {
            tokio::task::spawn_blocking(move || {
                work.enter();
                std::thread::sleep(Duration::from_millis(300));
                work.exit();
            })
            .await
            .map_err(|e| QueueError::Handler(e.to_string()))
        }
    });
    let config = EngineConfig::default()
        .with_max_concurrent(1)
        .with_max_attempts(1)
        .with_handler_timeout(Duration::from_millis(50));
    let engine = Engine::builder(config).with_handler(handler).build();
    let mut events = engine.subscribe();

    for id in 1..=3 {
        engine.enqueue(JobType::FileProcessing, file_payload(id));
    }
    engine.start().unwrap();

    let settled = collect_settled(&mut events, 3).await;
    for event in &settled {
        match event {
            EngineEvent::JobFailed { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    engine.stop().await.unwrap();
    assert!(engine.drain(Duration::from_secs(5)).await);
    assert_eq!(probe.finished.load(Ordering::SeqCst), 3);
    assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
    assert_eq!(engine.stats().in_flight, 0);
    assert_eq!(engine.limiter().available(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fifo_dispatch_with_single_permit() {
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen = order.clone();
    let handler = FnHandler::new(JobType::FileProcessing, move |payload| {
        let seen = seen.clone();
        async move {
            seen.lock().push(payload["fileId"].as_i64().unwrap_or_default());
            Ok(())
        }
    });
    let engine = Engine::builder(EngineConfig::default().with_max_concurrent(1))
        .with_handler(handler)
        .build();
    let mut events = engine.subscribe();

    for id in 1..=4 {
        engine.enqueue(JobType::FileProcessing, file_payload(id));
    }
    engine.start().unwrap();
    collect_settled(&mut events, 4).await;
    engine.stop().await.unwrap();

    assert_eq!(*order.lock(), vec![1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_type_does_not_block_others() {
    let probe = Arc::new(ConcurrencyProbe::default());
    let engine = Engine::builder(EngineConfig::default())
        .with_handler(probed_handler(JobType::FileProcessing, probe.clone()))
        .build();
    let mut events = engine.subscribe();

    let orphan = engine.enqueue(JobType::AiAnalysis, Payload::new());
    engine.enqueue(JobType::FileProcessing, file_payload(1));
    engine.enqueue(JobType::FileProcessing, file_payload(2));
    engine.start().unwrap();

    let settled = collect_settled(&mut events, 3).await;
    engine.stop().await.unwrap();

    let failed: Vec<_> = settled
        .iter()
        .filter_map(|e| match e {
            EngineEvent::JobFailed { job, reason } => Some((job.id(), reason.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, orphan);
    assert!(failed[0].1.contains("ai_analysis"));
    assert_eq!(probe.finished.load(Ordering::SeqCst), 2);

    let dead = engine.dead_letters().load(&orphan).await.unwrap().unwrap();
    assert_eq!(dead.status(), JobStatus::Failed);
    assert_eq!(dead.retry_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_attempt_is_requeued_with_backoff() {
    let handler = FnHandler::new(JobType::EmailNotification, |_| async {
        Err(QueueError::Handler("smtp unreachable".to_string()))
    });
    let engine = Engine::builder(EngineConfig::default())
        .with_handler(handler)
        .build();
    let mut events = engine.subscribe();

    let id = engine.enqueue(JobType::EmailNotification, Payload::new());
    engine.start().unwrap();
    let settled = collect_settled(&mut events, 1).await;
    engine.stop().await.unwrap();

    match &settled[0] {
        EngineEvent::JobRetryScheduled { job, delay } => {
            assert_eq!(job.id(), id);
            assert_eq!(job.retry_count(), 1);
            assert_eq!(job.status(), JobStatus::Pending);
            assert_eq!(job.last_error(), Some("Handler failed: smtp unreachable"));
            assert_eq!(*delay, Duration::from_secs(120));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let now = Utc::now();
    assert_eq!(engine.queue().len(), 1);
    assert_eq!(engine.queue().eligible_len_at(now), 0);
    assert_eq!(
        engine.queue().eligible_len_at(now + chrono::Duration::minutes(3)),
        1
    );
    assert_eq!(engine.stats().retried, 1);
}

struct OneFile;

#[async_trait]
impl FileRepository for OneFile {
    async fn fetch(&self, file_id: i64) -> Result<StoredFile, QueueError> {
        Ok(StoredFile {
            id: file_id,
            user_id: Some(1),
            file_name: "lecture.txt".to_string(),
            mime_type: "text/plain".to_string(),
            bytes: b"the cell membrane".to_vec(),
        })
    }

    async fn save_extraction(&self, _file_id: i64, _outcome: &ExtractionOutcome) -> Result<(), QueueError> {
        Ok(())
    }

    async fn save_subject(&self, _file_id: i64, _subject: &SubjectAssignment) -> Result<(), QueueError> {
        Ok(())
    }
}

struct PlainText;

#[async_trait]
impl ContentExtractor for PlainText {
    async fn extract(&self, file: &StoredFile) -> Result<ExtractionOutcome, QueueError> {
        Ok(ExtractionOutcome::completed(String::from_utf8_lossy(&file.bytes)))
    }
}

struct OfflineClassifier;

#[async_trait]
impl SubjectDetector for OfflineClassifier {
    async fn detect(&self, _file: &StoredFile, _text: &str) -> Result<SubjectAssignment, QueueError> {
        Err(QueueError::Collaborator("classifier offline".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_detection_failure_still_completes_file_job() {
    let engine = Engine::builder(EngineConfig::default())
        .with_handler(FileProcessingHandler::new(
            Arc::new(OneFile),
            Arc::new(PlainText),
            Arc::new(OfflineClassifier),
        ))
        .build();
    let mut events = engine.subscribe();

    engine.enqueue(JobType::FileProcessing, file_payload(11));
    engine.start().unwrap();
    let settled = collect_settled(&mut events, 1).await;
    engine.stop().await.unwrap();

    assert!(matches!(
        &settled[0],
        EngineEvent::JobCompleted { job } if job.status() == JobStatus::Completed && job.retry_count() == 0
    ));
    assert_eq!(engine.stats().retried, 0);
    assert!(engine.queue().is_empty());
}

#[test]
fn test_four_attempt_budget_backs_off_two_four_eight_minutes() {
    let policy = RetryPolicy::new(4, Duration::from_secs(60), Duration::from_secs(3600));
    let queue = JobQueue::new();
    let mut now = Utc::now();
    let mut job = JobRecord::new(JobType::FileProcessing, file_payload(9));
    let mut delays = Vec::new();

    loop {
        match policy.on_failure_at(job, "extractor down", &queue, now) {
            RetryOutcome::Retried { job: retried, delay } => {
                delays.push((retried.retry_count(), delay.as_secs()));
                assert!(queue.try_dequeue_at(now).is_none());
                now = retried.scheduled_for();
                job = queue.try_dequeue_at(now).unwrap();
            }
            RetryOutcome::Exhausted(failed) => {
                assert_eq!(failed.status(), JobStatus::Failed);
                assert_eq!(failed.retry_count(), 3);
                break;
            }
        }
    }

    assert_eq!(delays, vec![(1, 120), (2, 240), (3, 480)]);
    assert!(queue.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_lose_nothing() {
    let engine = Arc::new(
        Engine::builder(EngineConfig::default().with_wake_on_enqueue(false)).build(),
    );

    let producers: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                (0..50)
                    .map(|i| engine.enqueue(JobType::EmailNotification, file_payload(i)))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for producer in producers {
        for id in producer.await.unwrap() {
            assert!(ids.insert(id));
        }
    }

    assert_eq!(ids.len(), 400);
    assert_eq!(engine.queue().len(), 400);
    assert_eq!(engine.stats().enqueued, 400);

    let mut drained = HashSet::new();
    while let Some(job) = engine.queue().try_dequeue() {
        assert!(drained.insert(job.id()));
    }
    assert_eq!(drained, ids);
}
