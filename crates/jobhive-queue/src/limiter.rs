//! Concurrency limiter.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::{QueueError, QueueResult};

/// Counting gate bounding how many handlers run at once.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max: usize,
}

/// Authorization for one job to execute.
///
/// Held for the whole handler run; dropping it (or calling
/// [`JobPermit::release`]) returns it to the limiter.
#[derive(Debug)]
pub struct JobPermit {
    _permit: OwnedSemaphorePermit,
}

impl JobPermit {
    /// Return the permit explicitly.
    pub fn release(self) {}
}

impl ConcurrencyLimiter {
    /// Create a limiter with `max` permits (at least one).
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Wait for a permit without blocking a worker thread.
    pub async fn acquire(&self) -> QueueResult<JobPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| QueueError::NotRunning)?;
        Ok(JobPermit { _permit: permit })
    }

    /// Take a permit if one is free right now.
    pub fn try_acquire(&self) -> Option<JobPermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Some(JobPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => None,
        }
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held.
    pub fn in_use(&self) -> usize {
        self.max - self.available()
    }

    /// Configured permit count.
    pub fn max(&self) -> usize {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_try_acquire_bounded() {
        let limiter = ConcurrencyLimiter::new(2);
        let a = limiter.try_acquire().unwrap();
        let _b = limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.in_use(), 2);

        a.release();
        assert_eq!(limiter.available(), 1);
        assert!(limiter.try_acquire().is_some());
    }

    #[test]
    fn test_zero_is_clamped() {
        let limiter = ConcurrencyLimiter::new(0);
        assert_eq!(limiter.max(), 1);
        assert!(limiter.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_release() {
        let limiter = ConcurrencyLimiter::new(1);
        let held = limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
        assert_eq!(limiter.available(), 1);
    }
}
