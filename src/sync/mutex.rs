//! Single-permit lock that remembers who holds it.

use crate::error::{CoordinationError, Result};
use crate::stats::percentage;
use crate::sync::pool::{Handoff, PermitPool};
use crate::sync::semaphore::SemaphoreStats;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

struct MutexState {
    pool: PermitPool<String>,
    owner: Option<String>,
}

impl MutexState {
    fn hand_off(&mut self) {
        self.owner = match self.pool.give_back() {
            Handoff::Waiter(next) => Some(next),
            Handoff::Returned | Handoff::Overflow => None,
        };
    }
}

/// Mutual exclusion keyed by caller identity.
///
/// Ownership moves to the next waiter inside `unlock`, so `owner()` is
/// `Some` exactly when no permit is available. Not reentrant: locking again
/// as the current owner suspends until someone else unlocks.
pub struct OwnershipMutex {
    state: Mutex<MutexState>,
}

impl Default for OwnershipMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl OwnershipMutex {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MutexState {
                pool: PermitPool::new(1),
                owner: None,
            }),
        }
    }

    pub async fn lock(&self, owner: impl Into<String>) {
        let owner = owner.into();
        let wake = {
            let mut state = self.state();
            if state.pool.try_take() {
                state.owner = Some(owner);
                return;
            }
            state.pool.enqueue(owner)
        };
        let mut waiting = Waiting {
            mutex: self,
            wake: Some(wake),
        };
        if let Some(wake) = waiting.wake.as_mut() {
            let _ = wake.await;
        }
        waiting.wake = None;
    }

    pub fn try_lock(&self, owner: impl Into<String>) -> bool {
        let mut state = self.state();
        if state.pool.try_take() {
            state.owner = Some(owner.into());
            true
        } else {
            false
        }
    }

    /// Release the lock on behalf of `caller`. Fails without touching the
    /// permit unless `caller` is the current owner.
    pub fn unlock(&self, caller: &str) -> Result<()> {
        let mut state = self.state();
        if state.owner.as_deref() != Some(caller) {
            warn!(caller, owner = ?state.owner, "Unlock attempted by non-owner");
            return Err(CoordinationError::OwnershipViolation {
                caller: caller.to_string(),
                owner: state.owner.clone(),
            });
        }
        state.hand_off();
        Ok(())
    }

    pub fn owner(&self) -> Option<String> {
        self.state().owner.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.state().owner.is_some()
    }

    pub fn available_permits(&self) -> usize {
        self.state().pool.available()
    }

    pub fn stats(&self) -> SemaphoreStats {
        let state = self.state();
        SemaphoreStats {
            available: state.pool.available(),
            capacity: state.pool.capacity(),
            in_use: state.pool.in_use(),
            queue_length: state.pool.queue_length(),
            utilization_rate: percentage(state.pool.in_use() as u64, 1),
        }
    }

    fn state(&self) -> MutexGuard<'_, MutexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A suspended `lock`. If ownership already moved to it when it is dropped,
/// ownership moves on to the next waiter instead.
struct Waiting<'a> {
    mutex: &'a OwnershipMutex,
    wake: Option<oneshot::Receiver<()>>,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        let Some(mut wake) = self.wake.take() else {
            return;
        };
        let mut state = self.mutex.state();
        if state.pool.abandon(&mut wake) {
            debug!(owner = ?state.owner, "Lock waiter dropped after handoff");
            state.hand_off();
        }
    }
}
