    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use crate::error::QueueResult;
    use crate::handler::FnHandler;
    use crate::job::{JobStatus, Payload};
    use crate::limiter::ConcurrencyLimiter;
    use crate::store::MemoryDeadLetterStore;

    struct Fixture {
        dispatcher: Dispatcher,
        queue: Arc<JobQueue>,
        limiter: ConcurrencyLimiter,
        dead_letters: Arc<MemoryDeadLetterStore>,
        events: broadcast::Receiver<EngineEvent>,
        counters: Arc<Counters>,
    }

    fn fixture(registry: HandlerRegistry, timeout: Option<Duration>) -> Fixture {
        let queue = Arc::new(JobQueue::new());
        let dead_letters = Arc::new(MemoryDeadLetterStore::new());
        let (tx, rx) = broadcast::channel(64);
        let counters = Arc::new(Counters::default());
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            queue.clone(),
            RetryPolicy::default(),
            dead_letters.clone(),
            timeout,
            tx,
            counters.clone(),
            Arc::new(Notify::new()),
        );
        Fixture {
            dispatcher,
            queue,
            limiter: ConcurrencyLimiter::new(1),
            dead_letters,
            events: rx,
            counters,
        }
    }

    fn registry_with(handler: FnHandler) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register(handler);
        registry
    }

    async fn exploding(_payload: Payload) -> QueueResult<()> {
        panic!("analysis blew up")
    }

    fn job(job_type: JobType) -> JobRecord {
        JobRecord::new(job_type, Payload::new())
    }

    #[tokio::test]
    async fn test_success_completes_and_releases_permit() {
        let mut f = fixture(
            registry_with(FnHandler::new(JobType::AiAnalysis, |_| async { Ok(()) })),
            None,
        );
        let permit = f.limiter.try_acquire().unwrap();

        let outcome = f.dispatcher.dispatch(job(JobType::AiAnalysis), permit).await;

        assert_eq!(outcome, DispatchOutcome::Completed);
        assert_eq!(f.limiter.available(), 1);
        assert!(f.queue.is_empty());
        assert!(matches!(f.events.recv().await.unwrap(), EngineEvent::JobStarted { attempt: 1, .. }));
        match f.events.recv().await.unwrap() {
            EngineEvent::JobCompleted { job } => assert_eq!(job.status(), JobStatus::Completed),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(f.counters.snapshot(1, 0).completed, 1);
    }

    #[tokio::test]
    async fn test_unroutable_job_fails_without_retry() {
        let mut f = fixture(HandlerRegistry::new(), None);
        let permit = f.limiter.try_acquire().unwrap();
        let unroutable = job(JobType::EmailNotification);
        let id = unroutable.id();

        let outcome = f.dispatcher.dispatch(unroutable, permit).await;

        assert_eq!(outcome, DispatchOutcome::Unroutable);
        assert_eq!(f.limiter.available(), 1);
        assert!(f.queue.is_empty());
        match f.events.recv().await.unwrap() {
            EngineEvent::JobFailed { job, reason } => {
                assert_eq!(job.id(), id);
                assert_eq!(job.status(), JobStatus::Failed);
                assert!(reason.contains("email_notification"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        let dead = f.dead_letters.list().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id(), id);
    }

    #[tokio::test]
    async fn test_failure_is_requeued_with_backoff() {
        let f = fixture(
            registry_with(FnHandler::new(JobType::FileProcessing, |_| async {
                Err(QueueError::Collaborator("storage offline".to_string()))
            })),
            None,
        );
        let permit = f.limiter.try_acquire().unwrap();
        let failing = job(JobType::FileProcessing);
        let id = failing.id();
        let before = Utc::now();

        let outcome = f.dispatcher.dispatch(failing, permit).await;

        assert_eq!(outcome, DispatchOutcome::Retried);
        assert_eq!(f.limiter.available(), 1);
        assert_eq!(f.queue.len(), 1);
        assert!(f.queue.try_dequeue().is_none());

        let requeued = f.queue.try_dequeue_at(before + chrono::Duration::minutes(3)).unwrap();
        assert_eq!(requeued.id(), id);
        assert_eq!(requeued.retry_count(), 1);
        assert_eq!(requeued.status(), JobStatus::Pending);
        assert!(requeued.last_error().unwrap().contains("storage offline"));
        assert!(requeued.scheduled_for() >= before + chrono::Duration::minutes(2));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let f = fixture(
            registry_with(FnHandler::new(JobType::AiAnalysis, exploding)),
            None,
        );
        let permit = f.limiter.try_acquire().unwrap();

        let outcome = f.dispatcher.dispatch(job(JobType::AiAnalysis), permit).await;

        assert_eq!(outcome, DispatchOutcome::Retried);
        let requeued = f
            .queue
            .try_dequeue_at(Utc::now() + chrono::Duration::hours(1))
            .unwrap();
        assert!(requeued.last_error().unwrap().contains("analysis blew up"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let f = fixture(
            registry_with(FnHandler::new(JobType::AiAnalysis, |_| async {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(())
            })),
            Some(Duration::from_secs(30)),
        );
        let permit = f.limiter.try_acquire().unwrap();

        let outcome = f.dispatcher.dispatch(job(JobType::AiAnalysis), permit).await;

        assert_eq!(outcome, DispatchOutcome::Retried);
        let requeued = f
            .queue
            .try_dequeue_at(Utc::now() + chrono::Duration::hours(1))
            .unwrap();
        assert!(requeued.last_error().unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_handler_keeps_permit_until_it_returns() {
        let Fixture {
            dispatcher,
            limiter,
            mut events,
            ..
        } = fixture(
            registry_with(FnHandler::new(JobType::AiAnalysis, |_| async {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(())
            })),
            Some(Duration::from_secs(30)),
        );
        let permit = limiter.try_acquire().unwrap();
        let started = tokio::time::Instant::now();

        let settled = async {
            loop {
                if let EngineEvent::JobRetryScheduled { .. } = events.recv().await.unwrap() {
                    break;
                }
            }
            (started.elapsed(), limiter.available())
        };
        let (outcome, (settled_after, available_when_settled)) =
            tokio::join!(dispatcher.dispatch(job(JobType::AiAnalysis), permit), settled);

        assert_eq!(outcome, DispatchOutcome::Retried);
        assert!(settled_after < Duration::from_secs(60));
        assert_eq!(available_when_settled, 0);
        assert!(started.elapsed() >= Duration::from_secs(600));
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_task_is_not_reported_as_panic() {
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        task.abort();
        let err = task.await.unwrap_err();

        match join_failure(err) {
            QueueError::HandlerCancelled(message) => assert!(message.contains("cancelled")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exhausted_job_goes_to_dead_letter() {
        let f = fixture(
            registry_with(FnHandler::new(JobType::AiAnalysis, |_| async {
                Err(QueueError::Handler("always".to_string()))
            })),
            None,
        );

        let mut current = job(JobType::AiAnalysis);
        let id = current.id();
        let mut outcomes = Vec::new();
        loop {
            let permit = f.limiter.try_acquire().unwrap();
            let outcome = f.dispatcher.dispatch(current, permit).await;
            outcomes.push(outcome);
            match f.queue.try_dequeue_at(Utc::now() + chrono::Duration::hours(1)) {
                Some(next) => current = next,
                None => break,
            }
        }

        assert_eq!(
            outcomes,
            vec![
                DispatchOutcome::Retried,
                DispatchOutcome::Retried,
                DispatchOutcome::Exhausted
            ]
        );
        let dead = f.dead_letters.list().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id(), id);
        assert_eq!(dead[0].retry_count(), 2);
        assert_eq!(f.counters.snapshot(1, 0).failed, 1);
        assert_eq!(f.counters.snapshot(1, 0).retried, 2);
    }

    #[tokio::test]
    async fn test_permit_held_while_handler_runs() {
        let observed = Arc::new(AtomicUsize::new(usize::MAX));
        let limiter = ConcurrencyLimiter::new(1);
        let probe = {
            let observed = observed.clone();
            let limiter = limiter.clone();
            FnHandler::new(JobType::AiAnalysis, move |_| {
                let observed = observed.clone();
                let limiter = limiter.clone();
                async move {
                    observed.store(limiter.available(), Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        let f = fixture(registry_with(probe), None);
        let permit = limiter.try_acquire().unwrap();

        f.dispatcher.dispatch(job(JobType::AiAnalysis), permit).await;

        assert_eq!(observed.load(Ordering::SeqCst), 0);
        assert_eq!(limiter.available(), 1);
    }
