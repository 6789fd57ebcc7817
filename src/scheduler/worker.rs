use crate::stats::percentage;
use serde::{Deserialize, Serialize};

pub type WorkerId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    pub id: WorkerId,
    pub current_load: u32,
    pub max_load: u32,
    pub active: bool,
}

/// One entry of `messageScheduler.workers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub id: WorkerId,
    pub load: u32,
    pub max_load: u32,
    pub utilization_rate: String,
}

impl Worker {
    pub fn new(id: WorkerId, max_load: u32) -> Self {
        Self {
            id,
            current_load: 0,
            max_load,
            active: true,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.active && self.current_load < self.max_load
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            load: self.current_load,
            max_load: self.max_load,
            utilization_rate: percentage(self.current_load as u64, self.max_load as u64),
        }
    }
}
