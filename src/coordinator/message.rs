//! Chat message record kept in route logs and replayed on join.

use crate::queue::Priority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender_id: String,
    pub routing_key: String, // conversation or group
    pub payload: String,
    pub priority: Priority,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        sender_id: impl Into<String>,
        routing_key: impl Into<String>,
        payload: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            routing_key: routing_key.into(),
            payload: payload.into(),
            priority,
            sent_at: Utc::now(),
        }
    }
}
