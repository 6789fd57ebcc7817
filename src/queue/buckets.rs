use crate::queue::message::{Priority, QueuedMessage};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// `messageQueue` in the stats schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub urgent: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
    pub total: usize,
}

/// One FIFO per priority level, each kept sorted by enqueue time.
#[derive(Debug, Default)]
pub struct PriorityBuckets {
    buckets: [VecDeque<QueuedMessage>; 4],
}

impl PriorityBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert after every message enqueued at or before this one, so equal
    /// timestamps keep arrival order.
    pub fn push(&mut self, message: QueuedMessage) {
        let bucket = &mut self.buckets[message.priority.index()];
        let at = bucket.partition_point(|queued| queued.enqueued_at <= message.enqueued_at);
        bucket.insert(at, message);
    }

    /// Head of the highest non-empty level.
    pub fn pop(&mut self) -> Option<QueuedMessage> {
        self.buckets.iter_mut().find_map(VecDeque::pop_front)
    }

    pub fn len_of(&self, priority: Priority) -> usize {
        self.buckets[priority.index()].len()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(VecDeque::is_empty)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            urgent: self.len_of(Priority::Urgent),
            high: self.len_of(Priority::High),
            normal: self.len_of(Priority::Normal),
            low: self.len_of(Priority::Low),
            total: self.len(),
        }
    }
}
