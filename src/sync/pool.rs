//! Permit bookkeeping shared by the semaphore and the mutex.
//!
//! The pool itself never blocks: a caller that cannot take a permit gets a
//! oneshot receiver to await, and `give_back` resolves the oldest live one.

use std::collections::VecDeque;
use tokio::sync::oneshot;

struct Waiter<T> {
    tag: T,
    wake: oneshot::Sender<()>,
}

/// Where a released permit went.
pub(crate) enum Handoff<T> {
    /// Passed straight to a suspended waiter; `available` is unchanged.
    Waiter(T),
    /// Returned to the pool.
    Returned,
    /// Nothing was outstanding, so the release was ignored.
    Overflow,
}

pub(crate) struct PermitPool<T> {
    capacity: usize,
    available: usize,
    waiters: VecDeque<Waiter<T>>,
}

impl<T> PermitPool<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            available: capacity,
            waiters: VecDeque::new(),
        }
    }

    pub(crate) fn try_take(&mut self) -> bool {
        if self.available > 0 {
            self.available -= 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn enqueue(&mut self, tag: T) -> oneshot::Receiver<()> {
        let (wake, rx) = oneshot::channel();
        self.waiters.push_back(Waiter { tag, wake });
        rx
    }

    /// Withdraw a waiter whose future is being dropped. Returns `true` if a
    /// permit was already handed to it; the caller must pass that permit on
    /// while still holding the lock that guards this pool.
    pub(crate) fn abandon(&mut self, wake: &mut oneshot::Receiver<()>) -> bool {
        wake.close();
        self.waiters.retain(|w| !w.wake.is_closed());
        wake.try_recv().is_ok()
    }

    pub(crate) fn give_back(&mut self) -> Handoff<T> {
        // Waiters whose future was dropped refuse the send; skip them.
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.wake.send(()).is_ok() {
                return Handoff::Waiter(waiter.tag);
            }
        }
        if self.available < self.capacity {
            self.available += 1;
            Handoff::Returned
        } else {
            Handoff::Overflow
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn available(&self) -> usize {
        self.available
    }

    pub(crate) fn in_use(&self) -> usize {
        self.capacity - self.available
    }

    pub(crate) fn queue_length(&self) -> usize {
        self.waiters.iter().filter(|w| !w.wake.is_closed()).count()
    }
}
