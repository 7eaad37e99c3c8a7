//! In-flight dispatch tracking.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Counts outstanding dispatch operations so shutdown can wait for them.
///
/// Cheap to clone; all clones share one counter.
#[derive(Clone)]
pub struct RequestTracker {
    count: Arc<watch::Sender<usize>>,
}

/// Marks one operation as in flight until dropped.
pub struct InFlightGuard {
    count: Arc<watch::Sender<usize>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            count: Arc::new(count),
        }
    }

    /// Register an operation that is about to start.
    ///
    /// Useful when the operation runs in a spawned task: taking the guard
    /// before spawning closes the window where the task exists but is not
    /// yet counted.
    pub fn begin(&self) -> InFlightGuard {
        self.count.send_modify(|n| *n += 1);
        InFlightGuard {
            count: self.count.clone(),
        }
    }

    /// Run `fut` while counted as in flight.
    pub async fn track<F: Future>(&self, fut: F) -> F::Output {
        let _guard = self.begin();
        fut.await
    }

    /// Number of operations currently in flight.
    pub fn in_flight(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolve once no operations remain in flight.
    ///
    /// Operations that begin while the wait is pending are also awaited;
    /// the wait only resolves at an observed count of zero.
    pub async fn wait_for_idle(&self) {
        let mut rx = self.count.subscribe();
        // We hold the sender, so the channel cannot close under us.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n -= 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn idle_tracker_resolves_immediately() {
        let tracker = RequestTracker::new();
        assert_eq!(tracker.in_flight(), 0);
        tracker.wait_for_idle().await;
    }

    #[tokio::test]
    async fn track_counts_during_the_future_only() {
        let tracker = RequestTracker::new();

        let inner = tracker.clone();
        let observed = tracker
            .track(async move { inner.in_flight() })
            .await;

        assert_eq!(observed, 1);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn wait_for_idle_waits_for_spawned_operations() {
        let tracker = RequestTracker::new();

        let guard = tracker.begin();
        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_for_idle().await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn late_arriving_operations_are_also_awaited() {
        let tracker = RequestTracker::new();

        let first = tracker.begin();
        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_for_idle().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A second operation starts while the wait is pending.
        let second = tracker.begin();
        drop(first);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(second);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn guard_decrements_even_if_future_panics() {
        let tracker = RequestTracker::new();

        let inner = tracker.clone();
        let handle = tokio::spawn(async move {
            inner.track(async { panic!("boom") }).await;
        });
        assert!(handle.await.is_err());

        assert_eq!(tracker.in_flight(), 0);
        tracker.wait_for_idle().await;
    }
}
