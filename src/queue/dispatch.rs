//! Single-flight delivery loop with bounded retries.

use crate::error::{CoordinationError, DeliveryError};
use crate::queue::buckets::{PriorityBuckets, QueueStats};
use crate::queue::message::QueuedMessage;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, error, instrument, warn};

/// Attempts delivery of one dequeued message.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn deliver(&self, message: &QueuedMessage) -> Result<(), DeliveryError>;
}

/// Receives messages the queue gave up on.
pub trait DeliveryObserver: Send + Sync {
    fn delivery_exhausted(&self, message: &QueuedMessage, error: &CoordinationError);
}

/// Stand-in for a network send: waits out a fixed latency, then succeeds.
#[derive(Debug, Clone)]
pub struct SimulatedNetwork {
    latency: Duration,
}

impl SimulatedNetwork {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl DeliveryHandler for SimulatedNetwork {
    async fn deliver(&self, message: &QueuedMessage) -> Result<(), DeliveryError> {
        tokio::time::sleep(self.latency).await;
        debug!(message_id = %message.id, route = %message.routing_key, "Message delivered");
        Ok(())
    }
}

/// Default observer: every exhausted message becomes an error event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DeliveryObserver for TracingObserver {
    fn delivery_exhausted(&self, message: &QueuedMessage, error: &CoordinationError) {
        error!(
            message_id = %message.id,
            route = %message.routing_key,
            priority = ?message.priority,
            %error,
            "Dropping message"
        );
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchMetrics {
    pub delivered: u64,
    pub retried: u64,
    pub dropped: u64,
}

/// Priority queue plus the one delivery loop that drains it.
///
/// `submit` starts the loop on the current tokio runtime when no loop is
/// running. A message that fails `max_retries` times in total is dropped
/// and handed to the observer; the submitter never sees the failure.
pub struct PriorityDispatchQueue {
    buckets: Mutex<PriorityBuckets>,
    draining: AtomicBool,
    idle: Notify,
    handler: Arc<dyn DeliveryHandler>,
    observer: Arc<dyn DeliveryObserver>,
    max_retries: u32,
    delivered: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

impl PriorityDispatchQueue {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(
        handler: Arc<dyn DeliveryHandler>,
        observer: Arc<dyn DeliveryObserver>,
        max_retries: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            buckets: Mutex::new(PriorityBuckets::new()),
            draining: AtomicBool::new(false),
            idle: Notify::new(),
            handler,
            observer,
            max_retries: max_retries.max(1),
            delivered: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Queue `message` and make sure a drain loop is running. Called outside
    /// a tokio runtime, the message stays queued and is picked up by the
    /// next submit made from inside one.
    pub fn submit(self: &Arc<Self>, message: QueuedMessage) {
        self.buckets().push(message);
        self.start_drain();
    }

    pub fn stats(&self) -> QueueStats {
        self.buckets().stats()
    }

    pub fn metrics(&self) -> DispatchMetrics {
        DispatchMetrics {
            delivered: self.delivered.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        !self.is_draining() && self.buckets().is_empty()
    }

    /// Resolves once no drain is running and every bucket is empty.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    fn start_drain(self: &Arc<Self>) {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            match Handle::try_current() {
                Ok(runtime) => {
                    let queue = Arc::clone(self);
                    runtime.spawn(async move { queue.drain().await });
                }
                Err(e) => {
                    self.draining.store(false, Ordering::Release);
                    warn!(
                        queued = self.buckets().len(),
                        error = %e,
                        "No tokio runtime; message held until the next submit inside one"
                    );
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn drain(&self) {
        loop {
            let next = self.buckets().pop();
            match next {
                Some(message) => self.attempt(message).await,
                None => {
                    self.draining.store(false, Ordering::Release);
                    // A submit that landed after the pop saw the flag still
                    // set and did not start a loop; pick its work up here.
                    let resume = !self.buckets().is_empty()
                        && self
                            .draining
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok();
                    if !resume {
                        self.idle.notify_waiters();
                        return;
                    }
                }
            }
        }
    }

    async fn attempt(&self, mut message: QueuedMessage) {
        let outcome = self.handler.deliver(&message).await;
        match outcome {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                message.retry_count += 1;
                if message.retry_count >= self.max_retries {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    let exhausted = CoordinationError::DeliveryExhausted {
                        message_id: message.id,
                        attempts: message.retry_count,
                    };
                    self.observer.delivery_exhausted(&message, &exhausted);
                } else {
                    warn!(
                        message_id = %message.id,
                        attempt = message.retry_count,
                        max_retries = self.max_retries,
                        error = %err,
                        "Delivery failed, requeueing"
                    );
                    self.retried.fetch_add(1, Ordering::Relaxed);
                    self.buckets().push(message);
                }
            }
        }
    }

    fn buckets(&self) -> MutexGuard<'_, PriorityBuckets> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
