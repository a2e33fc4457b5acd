//! Per-key minimum-interval gate
//!
//! A [`Throttle`] remembers when each named operation last ran and refuses
//! to run it again before its interval has elapsed. Callers that are turned
//! away get `None` immediately; nothing is queued or delayed.
//!
//! The timestamp map is guarded by one mutex that is held only for the
//! check-and-set, never while the operation itself runs.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Key-scoped rate gate shared by the writer and background jobs.
#[derive(Debug, Default)]
pub struct Throttle {
    last_run: Mutex<HashMap<String, Instant>>,
}

impl Throttle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `key` if `min_interval` has passed since the last
    /// claim. A key that never ran is always admitted.
    ///
    /// Two racing callers cannot both succeed: the check and the timestamp
    /// update happen under the same lock.
    pub fn try_acquire(&self, key: &str, min_interval: Duration) -> bool {
        let now = Instant::now();
        let mut last_run = self.last_run.lock();
        match last_run.get(key) {
            Some(&last) if now.saturating_duration_since(last) < min_interval => {
                trace!(key, "Throttled");
                false
            }
            _ => {
                last_run.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Run `op` unless `key` ran within `min_interval`.
    ///
    /// The slot is claimed before `op` starts, so a concurrent caller that
    /// arrives while `op` is still running is throttled too.
    pub async fn run<F, Fut, T>(&self, key: &str, min_interval: Duration, op: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.try_acquire(key, min_interval) {
            Some(op().await)
        } else {
            None
        }
    }

    /// Forget the last run of `key`, admitting the next caller.
    pub fn reset(&self, key: &str) {
        self.last_run.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_runs() {
        let throttle = Throttle::new();
        let result = throttle
            .run("job", Duration::from_secs(1), || async { 7 })
            .await;
        assert_eq!(result, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_within_interval_skipped() {
        let throttle = Throttle::new();
        assert!(throttle.try_acquire("job", Duration::from_secs(1)));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!throttle.try_acquire("job", Duration::from_secs(1)));

        tokio::time::advance(Duration::from_millis(501)).await;
        assert!(throttle.try_acquire("job", Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let throttle = Throttle::new();
        assert!(throttle.try_acquire("a", Duration::from_secs(60)));
        assert!(throttle.try_acquire("b", Duration::from_secs(60)));
        assert!(!throttle.try_acquire("a", Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_admits_next_caller() {
        let throttle = Throttle::new();
        assert!(throttle.try_acquire("a", Duration::from_secs(60)));
        throttle.reset("a");
        assert!(throttle.try_acquire("a", Duration::from_secs(60)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_admit_one() {
        let throttle = Arc::new(Throttle::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let throttle = throttle.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                throttle
                    .run("flush", Duration::from_secs(60), || async {
                        runs.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
