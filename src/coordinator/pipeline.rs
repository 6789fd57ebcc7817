//! Per-message pipeline over the server context.

use crate::coordinator::context::{ServerContext, SystemStats};
use crate::coordinator::message::ChatMessage;
use crate::coordinator::transport::{ConnectionId, MessageSink};
use crate::deadlock::{ReleaseOutcome, RequestOutcome};
use crate::queue::QueuedMessage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const TEMPORARILY_UNAVAILABLE: &str = "temporarily unavailable";
pub const SHUTTING_DOWN: &str = "server shutting down";

/// Reply to the transport for an inbound message or connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

impl Admission {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Clone)]
pub struct Coordinator {
    context: Arc<ServerContext>,
}

impl Coordinator {
    pub fn new(context: Arc<ServerContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Admit a connection, waiting for a free permit if the server is full.
    #[instrument(skip(self, sink))]
    pub async fn connect(&self, connection_id: &str, sink: Arc<dyn MessageSink>) -> Admission {
        if self.context.is_closed() {
            return Admission::rejected(SHUTTING_DOWN);
        }
        self.context.connection_gate.acquire().await;
        if self.context.is_closed() {
            self.context.connection_gate.release();
            return Admission::rejected(SHUTTING_DOWN);
        }

        let replaced = self
            .context
            .registry()
            .connections
            .insert(connection_id.to_string(), sink)
            .is_some();
        if replaced {
            // One permit per connection id.
            self.context.connection_gate.release();
        }
        info!(replaced, "Connection admitted");
        Admission::accepted()
    }

    /// Drop a connection, its route memberships and any resources it holds.
    pub fn disconnect(&self, connection_id: &str) -> bool {
        let removed = {
            let mut registry = self.context.registry();
            let removed = registry.connections.remove(connection_id).is_some();
            if removed {
                for members in registry.routes.values_mut() {
                    members.remove(connection_id);
                }
                registry.routes.retain(|_, members| !members.is_empty());
            }
            removed
        };
        if removed {
            self.context.connection_gate.release();
            self.context.guard().release_all(connection_id);
            info!(connection = connection_id, "Connection closed");
        }
        removed
    }

    /// Subscribe a connection to a route and return the replayed log.
    /// `None` if the connection is unknown.
    pub fn join_route(&self, connection_id: &str, routing_key: &str) -> Option<Vec<ChatMessage>> {
        {
            let mut registry = self.context.registry();
            if !registry.connections.contains_key(connection_id) {
                return None;
            }
            registry
                .routes
                .entry(routing_key.to_string())
                .or_default()
                .insert(connection_id.to_string());
        }
        Some(self.on_join_route(routing_key))
    }

    pub fn leave_route(&self, connection_id: &str, routing_key: &str) -> bool {
        let mut registry = self.context.registry();
        let Some(members) = registry.routes.get_mut(routing_key) else {
            return false;
        };
        let removed = members.remove(connection_id);
        if members.is_empty() {
            registry.routes.remove(routing_key);
        }
        removed
    }

    /// Message log for `routing_key`, from the cache or else the store.
    pub fn on_join_route(&self, routing_key: &str) -> Vec<ChatMessage> {
        if let Some(log) = self.context.cache().get(routing_key).cloned() {
            return log;
        }
        let log = self.context.store.load(routing_key);
        if !log.is_empty() {
            self.context.cache().put(routing_key.to_string(), log.clone());
        }
        log
    }

    /// Admit, classify, queue, record and fan out one inbound message.
    ///
    /// Nothing here awaits, so the routing key is held only for the
    /// duration of this call. Delivery starts on the ambient tokio runtime;
    /// without one the message waits in the queue for the next call made
    /// inside a runtime.
    #[instrument(skip(self, payload))]
    pub fn on_incoming_message(&self, sender_id: &str, routing_key: &str, payload: &str) -> Admission {
        if self.context.is_closed() {
            return Admission::rejected(SHUTTING_DOWN);
        }

        // 1. Claim the routing key for this sender.
        {
            let mut guard = self.context.guard();
            match guard.request_resource(sender_id, routing_key) {
                Ok(RequestOutcome::Granted) => {}
                Ok(RequestOutcome::Pending) => {
                    // Retract in the same critical section so a release
                    // cannot hand us the key after we gave up.
                    guard.cancel_wait(sender_id, routing_key);
                    debug!("Routing key busy");
                    return Admission::rejected(TEMPORARILY_UNAVAILABLE);
                }
                Err(err) => {
                    warn!(error = %err, "Message refused");
                    return Admission::rejected(TEMPORARILY_UNAVAILABLE);
                }
            }
        }

        // 2. Classify, 3. queue for delivery.
        let priority = self.context.classifier.classify(payload);
        let message = ChatMessage::new(sender_id, routing_key, payload, priority);
        self.context
            .queue
            .submit(QueuedMessage::new(routing_key, payload, priority).with_id(message.id));

        // 4. Advisory worker accounting; saturation never blocks delivery.
        let worker = match self.context.balancer().try_assign() {
            Ok(id) => Some(id),
            Err(err) => {
                debug!(error = %err, "Proceeding without a worker");
                None
            }
        };

        // 5. Record in the route log and refresh the cache.
        let log = self.context.store.append(routing_key, message.clone());
        self.context.cache().put(routing_key.to_string(), log);

        // 6. Fan out.
        let recipients = self.fan_out(routing_key, &message);

        // 7. Close out.
        if let Some(id) = worker {
            self.context.balancer().release_task(id);
        }
        if let ReleaseOutcome::HandedOff(next) =
            self.context.guard().release_resource(sender_id, routing_key)
        {
            debug!(next = %next, "Routing key handed to waiter");
        }

        debug!(?priority, recipients, "Message accepted");
        Admission::accepted()
    }

    pub fn stats(&self) -> SystemStats {
        self.context.stats()
    }

    /// Send to each distinct member of the route once. Returns how many
    /// sends succeeded.
    fn fan_out(&self, routing_key: &str, message: &ChatMessage) -> usize {
        let sinks: Vec<(ConnectionId, Arc<dyn MessageSink>)> = {
            let registry = self.context.registry();
            match registry.routes.get(routing_key) {
                Some(members) => members
                    .iter()
                    .filter_map(|id| {
                        registry
                            .connections
                            .get(id)
                            .map(|sink| (id.clone(), Arc::clone(sink)))
                    })
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut sent = 0;
        for (id, sink) in &sinks {
            match sink.send(message) {
                Ok(()) => sent += 1,
                Err(err) => warn!(connection = %id, error = %err, "Recipient send failed"),
            }
        }
        sent
    }
}
