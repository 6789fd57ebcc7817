//! Counting semaphore with strict FIFO wakeups.

use crate::error::{CoordinationError, Result};
use crate::stats::percentage;
use crate::sync::pool::{Handoff, PermitPool};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// `connectionSemaphore` in the stats schema; also used for the mutex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemaphoreStats {
    pub available: usize,
    pub capacity: usize,
    pub in_use: usize,
    pub queue_length: usize,
    pub utilization_rate: String,
}

/// Permit pool gating how many connections may be admitted at once.
///
/// `release` hands its permit to the oldest suspended `acquire` rather than
/// returning it to the pool, so a late `try_acquire` can never overtake a
/// queued waiter. A suspended `acquire` waits indefinitely.
pub struct AdmissionSemaphore {
    pool: Mutex<PermitPool<()>>,
}

impl AdmissionSemaphore {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CoordinationError::InvalidCapacity {
                component: "admission semaphore",
            });
        }
        Ok(Self {
            pool: Mutex::new(PermitPool::new(capacity)),
        })
    }

    pub async fn acquire(&self) {
        let wake = {
            let mut pool = self.lock();
            if pool.try_take() {
                return;
            }
            debug!(queued = pool.queue_length() + 1, "Semaphore exhausted, suspending");
            pool.enqueue(())
        };
        let mut waiting = Waiting {
            semaphore: self,
            wake: Some(wake),
        };
        if let Some(wake) = waiting.wake.as_mut() {
            // The sender lives in the pool for as long as `self` does, so
            // this only resolves through `release`.
            let _ = wake.await;
        }
        waiting.wake = None;
    }

    /// Take a permit only if one is free right now.
    pub fn try_acquire(&self) -> bool {
        self.lock().try_take()
    }

    pub fn release(&self) {
        if let Handoff::Overflow = self.lock().give_back() {
            warn!("Semaphore released with no outstanding permit; ignoring");
        }
    }

    pub fn available_permits(&self) -> usize {
        self.lock().available()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn stats(&self) -> SemaphoreStats {
        let pool = self.lock();
        SemaphoreStats {
            available: pool.available(),
            capacity: pool.capacity(),
            in_use: pool.in_use(),
            queue_length: pool.queue_length(),
            utilization_rate: percentage(pool.in_use() as u64, pool.capacity() as u64),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PermitPool<()>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A suspended `acquire`. Dropped before completion, it leaves the queue and
/// passes on any permit that was handed to it in the meantime.
struct Waiting<'a> {
    semaphore: &'a AdmissionSemaphore,
    wake: Option<oneshot::Receiver<()>>,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        let Some(mut wake) = self.wake.take() else {
            return;
        };
        let mut pool = self.semaphore.lock();
        if pool.abandon(&mut wake) {
            debug!("Waiter dropped after handoff, passing the permit on");
            pool.give_back();
        }
    }
}
