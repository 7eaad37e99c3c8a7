//! Strict-FIFO async lock guarding store read-modify-write cycles.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// A ticket-based async mutex with strict FIFO handoff.
///
/// Unlike a bare `tokio::sync::Mutex`, waiters are woken in exact arrival
/// order, so two racing read-modify-write cycles against the same store
/// blob are totally ordered. Not reentrant: acquiring twice from the same
/// task without dropping the first guard deadlocks that task.
pub struct TicketLock {
    state: Mutex<LockState>,
}

struct LockState {
    locked: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// RAII guard returned by [`TicketLock::acquire`]. Dropping it hands the
/// lock to the next waiter in line.
pub struct TicketGuard<'a> {
    lock: &'a TicketLock,
}

impl TicketLock {
    /// Create an unlocked lock with an empty wait queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                locked: false,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Acquire the lock, suspending behind any earlier waiters.
    ///
    /// If the lock is free and no one is queued, the caller proceeds
    /// immediately. Otherwise it takes a ticket and waits for the previous
    /// holder to release.
    pub async fn acquire(&self) -> TicketGuard<'_> {
        let waiter = {
            let mut state = self.state.lock().expect("lock poisoned");
            if state.locked {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            } else {
                state.locked = true;
                None
            }
        };

        if let Some(rx) = waiter {
            // The sender side is only dropped if the lock itself is dropped
            // while we wait, in which case there is nothing left to guard.
            let _ = rx.await;
        }

        TicketGuard { lock: self }
    }

    /// Hand the lock to the next live waiter, or unlock if none remain.
    ///
    /// A waiter whose receiver was dropped (cancelled acquire) is skipped.
    fn release(&self) {
        let mut state = self.state.lock().expect("lock poisoned");
        loop {
            match state.waiters.pop_front() {
                Some(next) => {
                    if next.send(()).is_ok() {
                        // Lock stays held, ownership moved to the waiter.
                        return;
                    }
                }
                None => {
                    state.locked = false;
                    return;
                }
            }
        }
    }
}

impl Default for TicketLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
