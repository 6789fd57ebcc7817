//! Narrow seams to the outside world: per-connection sinks and the
//! backing message store.

use crate::coordinator::message::ChatMessage;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;

pub type ConnectionId = String;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("Connection closed")]
    Closed,
    #[error("Send failed: {0}")]
    Failed(String),
}

/// Outbound side of one client connection. `send` must not block.
pub trait MessageSink: Send + Sync {
    fn send(&self, message: &ChatMessage) -> Result<(), SinkError>;
}

/// Where route logs live when they are not cached.
pub trait MessageStore: Send + Sync {
    fn load(&self, routing_key: &str) -> Vec<ChatMessage>;

    /// Append and return the full updated log.
    fn append(&self, routing_key: &str, message: ChatMessage) -> Vec<ChatMessage>;
}

/// Sink backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ChatMessage>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChatMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageSink for ChannelSink {
    fn send(&self, message: &ChatMessage) -> Result<(), SinkError> {
        self.tx.send(message.clone()).map_err(|_| SinkError::Closed)
    }
}

/// Process-memory store; everything is gone on restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    logs: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for InMemoryStore {
    fn load(&self, routing_key: &str) -> Vec<ChatMessage> {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.get(routing_key).cloned().unwrap_or_default()
    }

    fn append(&self, routing_key: &str, message: ChatMessage) -> Vec<ChatMessage> {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        let log = logs.entry(routing_key.to_string()).or_default();
        log.push(message);
        log.clone()
    }
}
