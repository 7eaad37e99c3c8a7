//! Network reachability collaborator.

use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of each subscriber's observation channel.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 16;

/// One reachability observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    /// Whether the internet currently appears reachable.
    pub is_internet_reachable: bool,
}

impl ConnectivityState {
    pub fn reachable() -> Self {
        Self {
            is_internet_reachable: true,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            is_internet_reachable: false,
        }
    }
}

/// Source of reachability observations.
///
/// Implementations deliver every observation, not only transitions; the
/// pipeline derives transitions from the last-known state itself.
/// Dropping the returned receiver unsubscribes.
pub trait ConnectivityMonitor: Send + Sync {
    fn subscribe(&self) -> mpsc::Receiver<ConnectivityState>;
}

/// A monitor fed by explicit [`report`](ManualConnectivity::report) calls.
///
/// Embedders bridge their platform's reachability API into this; tests
/// drive it directly.
#[derive(Default)]
pub struct ManualConnectivity {
    subscribers: Mutex<Vec<mpsc::Sender<ConnectivityState>>>,
}

impl ManualConnectivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one observation to every live subscriber.
    pub fn report(&self, state: ConnectivityState) {
        let mut subscribers = self.subscribers.lock().expect("lock poisoned");
        subscribers.retain(|sender| match sender.try_send(state) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Slow subscriber; keep it, drop this observation for it.
                debug!("Connectivity subscriber lagging, observation skipped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

impl ConnectivityMonitor for ManualConnectivity {
    fn subscribe(&self) -> mpsc::Receiver<ConnectivityState> {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.subscribers
            .lock()
            .expect("lock poisoned")
            .push(sender);
        receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_every_observation() {
        let monitor = ManualConnectivity::new();
        let mut rx = monitor.subscribe();

        monitor.report(ConnectivityState::reachable());
        monitor.report(ConnectivityState::reachable());
        monitor.report(ConnectivityState::unreachable());

        assert_eq!(rx.recv().await.unwrap(), ConnectivityState::reachable());
        assert_eq!(rx.recv().await.unwrap(), ConnectivityState::reachable());
        assert_eq!(rx.recv().await.unwrap(), ConnectivityState::unreachable());
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let monitor = ManualConnectivity::new();
        let mut a = monitor.subscribe();
        let mut b = monitor.subscribe();

        monitor.report(ConnectivityState::unreachable());

        assert_eq!(a.recv().await.unwrap(), ConnectivityState::unreachable());
        assert_eq!(b.recv().await.unwrap(), ConnectivityState::unreachable());
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned() {
        let monitor = ManualConnectivity::new();
        let rx = monitor.subscribe();
        drop(rx);

        monitor.report(ConnectivityState::reachable());
        assert!(monitor.subscribers.lock().unwrap().is_empty());
    }
}
