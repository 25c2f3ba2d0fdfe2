//! Concurrency limiter for crawl and download tasks
//!
//! Two semaphores gate task admission: one bounds the total number of
//! concurrently-running tasks of a crawler, the other bounds the download
//! tasks among them. The download ceiling must not exceed the task ceiling,
//! so a download first takes a task slot and then a download slot; a download
//! waiting for its second permit therefore never starves the crawler of
//! progress, because some other download already holds one.
//!
//! An optional fixed delay paces task starts: each task waits until at least
//! `delay` has passed since the previously admitted task started. This is a
//! simple pacing control, not a token bucket.

use crate::ConfigError;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{Duration, Instant};

/// Bounds concurrent crawl and download tasks for one crawler
pub struct Limiter {
    tasks: Arc<Semaphore>,
    downloads: Arc<Semaphore>,
    delay: Duration,
    last_start: Mutex<Option<Instant>>,
}

/// Permit for a discovery (listing) task
pub struct CrawlPermit {
    _task: OwnedSemaphorePermit,
}

/// Permit for a download task
pub struct DownloadPermit {
    _task: OwnedSemaphorePermit,
    _download: OwnedSemaphorePermit,
}

impl Limiter {
    /// Creates a limiter.
    ///
    /// `task_limit` and `download_limit` must be at least 1 and
    /// `download_limit` must not exceed `task_limit`.
    pub fn new(
        task_limit: usize,
        download_limit: usize,
        delay: Duration,
    ) -> Result<Self, ConfigError> {
        if task_limit == 0 {
            return Err(ConfigError::Validation(
                "task limit must be at least 1".to_string(),
            ));
        }
        if download_limit == 0 {
            return Err(ConfigError::Validation(
                "download limit must be at least 1".to_string(),
            ));
        }
        if download_limit > task_limit {
            return Err(ConfigError::Validation(format!(
                "download limit ({}) must not be greater than task limit ({})",
                download_limit, task_limit
            )));
        }

        Ok(Self {
            tasks: Arc::new(Semaphore::new(task_limit)),
            downloads: Arc::new(Semaphore::new(download_limit)),
            delay,
            last_start: Mutex::new(None),
        })
    }

    /// Waits out the pacing delay, then claims this task's start slot.
    ///
    /// Consecutive callers are serialized at least `delay` apart. With a zero
    /// delay this is free.
    async fn pace(&self) {
        if self.delay.is_zero() {
            return;
        }

        let target = {
            let mut last = self
                .last_start
                .lock()
                .expect("limiter pacing lock poisoned");
            let now = Instant::now();
            let target = match *last {
                Some(prev) => {
                    let t = prev + self.delay;
                    if t > now {
                        t
                    } else {
                        now
                    }
                }
                None => now,
            };
            *last = Some(target);
            target
        };

        tokio::time::sleep_until(target).await;
    }

    /// Acquires a slot for a discovery task.
    pub async fn limit_crawl(&self) -> CrawlPermit {
        self.pace().await;
        let task = self
            .tasks
            .clone()
            .acquire_owned()
            .await
            .expect("limiter task semaphore closed");
        CrawlPermit { _task: task }
    }

    /// Acquires a slot for a download task (a task slot plus a download slot).
    pub async fn limit_download(&self) -> DownloadPermit {
        self.pace().await;
        let task = self
            .tasks
            .clone()
            .acquire_owned()
            .await
            .expect("limiter task semaphore closed");
        let download = self
            .downloads
            .clone()
            .acquire_owned()
            .await
            .expect("limiter download semaphore closed");
        DownloadPermit {
            _task: task,
            _download: download,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_limits_are_validated() {
        assert!(Limiter::new(0, 1, Duration::ZERO).is_err());
        assert!(Limiter::new(1, 0, Duration::ZERO).is_err());
        assert!(Limiter::new(1, 2, Duration::ZERO).is_err());
        assert!(Limiter::new(2, 2, Duration::ZERO).is_ok());
        assert!(Limiter::new(4, 1, Duration::ZERO).is_ok());
    }

    #[tokio::test]
    async fn test_task_limit_bounds_concurrency() {
        let limiter = Arc::new(Limiter::new(2, 1, Duration::ZERO).unwrap());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.limit_crawl().await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_download_limit_bounds_downloads() {
        let limiter = Arc::new(Limiter::new(4, 1, Duration::ZERO).unwrap());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = limiter.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.limit_download().await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_paces_task_starts() {
        let limiter = Arc::new(Limiter::new(4, 4, Duration::from_millis(100)).unwrap());

        let start = Instant::now();
        let _first = limiter.limit_crawl().await;
        let _second = limiter.limit_crawl().await;
        let _third = limiter.limit_crawl().await;

        // Third admission happens at least two delays after the first
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_zero_delay_admits_immediately() {
        let limiter = Limiter::new(2, 2, Duration::ZERO).unwrap();
        let started = Instant::now();
        let _a = limiter.limit_crawl().await;
        let _b = limiter.limit_download().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
