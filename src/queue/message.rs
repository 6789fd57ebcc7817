use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Low,
}

impl Priority {
    /// Highest first.
    pub const ALL: [Priority; 4] = [Self::Urgent, Self::High, Self::Normal, Self::Low];

    pub fn index(self) -> usize {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

/// A message owned by the dispatch queue until it is handed to delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: Uuid,
    pub routing_key: String,
    pub payload: String,
    pub priority: Priority,
    pub enqueued_at: DateTime<Utc>,
    /// Failed delivery attempts so far.
    pub retry_count: u32,
}

impl QueuedMessage {
    pub fn new(routing_key: impl Into<String>, payload: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            routing_key: routing_key.into(),
            payload: payload.into(),
            priority,
            enqueued_at: Utc::now(),
            retry_count: 0,
        }
    }

    pub fn with_enqueued_at(mut self, enqueued_at: DateTime<Utc>) -> Self {
        self.enqueued_at = enqueued_at;
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }
}
