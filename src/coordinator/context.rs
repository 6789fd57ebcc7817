//! Explicit server context: one instance of every primitive, built at
//! startup and torn down on shutdown.

use crate::cache::{CacheStats, ReplacementCache};
use crate::config::ServerConfig;
use crate::coordinator::classify::PriorityClassifier;
use crate::coordinator::message::ChatMessage;
use crate::coordinator::transport::{ConnectionId, InMemoryStore, MessageSink, MessageStore};
use crate::deadlock::{AllocationSnapshot, CycleGuard};
use crate::error::{ConfigError, CoordinationError};
use crate::queue::{
    DeliveryHandler, DeliveryObserver, PriorityDispatchQueue, QueueStats, SimulatedNetwork,
    TracingObserver,
};
use crate::scheduler::{LoadBalancer, SchedulerStats};
use crate::sync::{AdmissionSemaphore, SemaphoreStats};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Full statistics snapshot. Field names are consumed by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub message_queue: QueueStats,
    pub thread_cache: CacheStats,
    pub connection_semaphore: SemaphoreStats,
    pub message_scheduler: SchedulerStats,
    pub deadlock_detector: AllocationSnapshot,
}

/// Connections and route membership.
#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) connections: HashMap<ConnectionId, Arc<dyn MessageSink>>,
    pub(crate) routes: HashMap<String, BTreeSet<ConnectionId>>,
}

pub struct ServerContext {
    config: ServerConfig,
    pub(crate) queue: Arc<PriorityDispatchQueue>,
    pub(crate) classifier: PriorityClassifier,
    pub(crate) connection_gate: AdmissionSemaphore,
    pub(crate) store: Arc<dyn MessageStore>,
    cache: Mutex<ReplacementCache<String, Vec<ChatMessage>>>,
    balancer: Mutex<LoadBalancer>,
    guard: Mutex<CycleGuard>,
    registry: Mutex<Registry>,
    closed: AtomicBool,
    shutdown: Notify,
}

pub struct ServerContextBuilder {
    config: ServerConfig,
    store: Option<Arc<dyn MessageStore>>,
    handler: Option<Arc<dyn DeliveryHandler>>,
    observer: Option<Arc<dyn DeliveryObserver>>,
}

impl ServerContextBuilder {
    pub fn store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn delivery_handler(mut self, handler: Arc<dyn DeliveryHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn delivery_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> Result<Arc<ServerContext>, ConfigError> {
        let config = self.config;
        config.validate()?;

        let handler: Arc<dyn DeliveryHandler> = match self.handler {
            Some(handler) => handler,
            None => Arc::new(SimulatedNetwork::new(Duration::from_millis(
                config.queue.delivery_latency_ms,
            ))),
        };
        let observer: Arc<dyn DeliveryObserver> = match self.observer {
            Some(observer) => observer,
            None => Arc::new(TracingObserver),
        };
        let store: Arc<dyn MessageStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryStore::new()),
        };

        let context = ServerContext {
            queue: PriorityDispatchQueue::new(handler, observer, config.queue.max_retries),
            classifier: PriorityClassifier::from_config(&config.classifier)?,
            connection_gate: AdmissionSemaphore::new(config.connections.max_connections)
                .map_err(invalid)?,
            store,
            cache: Mutex::new(ReplacementCache::new(config.cache.capacity).map_err(invalid)?),
            balancer: Mutex::new(
                LoadBalancer::new(
                    config.scheduler.worker_count,
                    config.scheduler.max_load_per_worker,
                )
                .map_err(invalid)?,
            ),
            guard: Mutex::new(CycleGuard::new()),
            registry: Mutex::new(Registry::default()),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
            config,
        };
        info!(
            cache_capacity = context.config.cache.capacity,
            max_connections = context.config.connections.max_connections,
            workers = context.config.scheduler.worker_count,
            "Server context ready"
        );
        Ok(Arc::new(context))
    }
}

fn invalid(err: CoordinationError) -> ConfigError {
    ConfigError::Validation {
        reason: err.to_string(),
    }
}

impl ServerContext {
    pub fn builder(config: ServerConfig) -> ServerContextBuilder {
        ServerContextBuilder {
            config,
            store: None,
            handler: None,
            observer: None,
        }
    }

    /// Context with the in-memory store and simulated network.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, ConfigError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<PriorityDispatchQueue> {
        &self.queue
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SystemStats {
        SystemStats {
            message_queue: self.queue.stats(),
            thread_cache: self.cache().stats(),
            connection_semaphore: self.connection_gate.stats(),
            message_scheduler: self.balancer().stats(),
            deadlock_detector: self.guard().get_state(),
        }
    }

    /// Log the stats snapshot every `stats.report_interval_secs` until
    /// shutdown.
    pub fn spawn_stats_reporter(self: &Arc<Self>) -> JoinHandle<()> {
        let context = Arc::clone(self);
        let interval = Duration::from_secs(self.config.stats.report_interval_secs);
        tokio::spawn(async move {
            loop {
                let stop = context.shutdown.notified();
                tokio::pin!(stop);
                stop.as_mut().enable();
                if context.is_closed() {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        match serde_json::to_string(&context.stats()) {
                            Ok(json) => info!(stats = %json, "Coordination stats"),
                            Err(e) => warn!(error = %e, "Failed to serialize stats"),
                        }
                    }
                    _ = &mut stop => break,
                }
            }
        })
    }

    /// Stop accepting messages, let the queue drain, drop all connections.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.notify_waiters();
        self.queue.wait_idle().await;

        let mut registry = self.registry();
        let dropped = registry.connections.len();
        registry.connections.clear();
        registry.routes.clear();
        drop(registry);
        // Suspended connects wake on these permits, see the closed flag and
        // give them back.
        for _ in 0..dropped {
            self.connection_gate.release();
        }
        info!(connections = dropped, "Server context shut down");
    }

    pub(crate) fn cache(&self) -> MutexGuard<'_, ReplacementCache<String, Vec<ChatMessage>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn balancer(&self) -> MutexGuard<'_, LoadBalancer> {
        self.balancer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn guard(&self) -> MutexGuard<'_, CycleGuard> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
