//! Round-robin assignment bounded by per-worker capacity.

use crate::error::{CoordinationError, Result};
use crate::scheduler::worker::{Worker, WorkerId, WorkerStats};
use crate::stats::{decimal, percentage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// `messageScheduler` in the stats schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub total_workers: usize,
    pub active_workers: usize,
    pub total_load: u64,
    pub total_capacity: u64,
    pub avg_load: String,
    pub utilization_rate: String,
    pub workers: Vec<WorkerStats>,
}

#[derive(Debug)]
pub struct LoadBalancer {
    workers: Vec<Worker>,
    cursor: usize,
    next_id: WorkerId,
}

impl LoadBalancer {
    /// Pool of `worker_count` workers, ids `0..worker_count`.
    pub fn new(worker_count: usize, max_load: u32) -> Result<Self> {
        if max_load == 0 {
            return Err(CoordinationError::InvalidCapacity {
                component: "load balancer worker",
            });
        }
        let workers: Vec<Worker> = (0..worker_count as WorkerId)
            .map(|id| Worker::new(id, max_load))
            .collect();
        Ok(Self {
            next_id: workers.len() as WorkerId,
            workers,
            cursor: 0,
        })
    }

    /// Scan from the cursor for the first active worker below its limit.
    /// The cursor moves one step per worker inspected, hit or miss.
    pub fn assign_task(&mut self) -> Option<WorkerId> {
        for _ in 0..self.workers.len() {
            let slot = self.cursor;
            self.cursor = (self.cursor + 1) % self.workers.len();

            let worker = &mut self.workers[slot];
            if worker.has_capacity() {
                worker.current_load += 1;
                return Some(worker.id);
            }
        }
        None
    }

    /// Like [`assign_task`](Self::assign_task), reporting saturation as an error.
    pub fn try_assign(&mut self) -> Result<WorkerId> {
        self.assign_task().ok_or_else(|| {
            debug!(workers = self.workers.len(), "No worker has spare capacity");
            CoordinationError::CapacitySaturated {
                workers: self.workers.len(),
            }
        })
    }

    /// Returns `false` when the worker is unknown.
    pub fn release_task(&mut self, id: WorkerId) -> bool {
        match self.workers.iter_mut().find(|w| w.id == id) {
            Some(worker) => {
                worker.current_load = worker.current_load.saturating_sub(1);
                true
            }
            None => false,
        }
    }

    pub fn add_worker(&mut self, max_load: u32) -> Result<WorkerId> {
        if max_load == 0 {
            return Err(CoordinationError::InvalidCapacity {
                component: "load balancer worker",
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.workers.push(Worker::new(id, max_load));
        Ok(id)
    }

    /// Remove a worker. The cursor keeps pointing at the same next worker
    /// where possible and wraps to the start when it falls off the end.
    pub fn remove_worker(&mut self, id: WorkerId) -> Option<Worker> {
        let slot = self.workers.iter().position(|w| w.id == id)?;
        let removed = self.workers.remove(slot);
        if slot < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.workers.len() {
            self.cursor = 0;
        }
        Some(removed)
    }

    pub fn set_worker_active(&mut self, id: WorkerId, active: bool) -> bool {
        match self.workers.iter_mut().find(|w| w.id == id) {
            Some(worker) => {
                worker.active = active;
                true
            }
            None => false,
        }
    }

    pub fn worker(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.iter().find(|w| w.id == id)
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn stats(&self) -> SchedulerStats {
        let total_load: u64 = self.workers.iter().map(|w| w.current_load as u64).sum();
        let total_capacity: u64 = self.workers.iter().map(|w| w.max_load as u64).sum();
        SchedulerStats {
            total_workers: self.workers.len(),
            active_workers: self.workers.iter().filter(|w| w.active).count(),
            total_load,
            total_capacity,
            avg_load: decimal(total_load, self.workers.len() as u64),
            utilization_rate: percentage(total_load, total_capacity),
            workers: self.workers.iter().map(Worker::stats).collect(),
        }
    }
}
