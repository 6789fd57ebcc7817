//! End-to-end flows through the public API.

use async_trait::async_trait;
use parley_lib::coordinator::{ChannelSink, ChatMessage};
use parley_lib::error::DeliveryError;
use parley_lib::queue::{DeliveryHandler, DeliveryObserver, QueuedMessage};
use parley_lib::{Admission, CoordinationError, Coordinator, ServerConfig, ServerContext};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

struct AlwaysFails;

#[async_trait]
impl DeliveryHandler for AlwaysFails {
    async fn deliver(&self, _message: &QueuedMessage) -> Result<(), DeliveryError> {
        Err(DeliveryError::new("link down"))
    }
}

#[derive(Default)]
struct Exhausted {
    errors: Mutex<Vec<CoordinationError>>,
}

impl DeliveryObserver for Exhausted {
    fn delivery_exhausted(&self, _message: &QueuedMessage, error: &CoordinationError) {
        self.errors.lock().unwrap().push(error.clone());
    }
}

fn config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.queue.delivery_latency_ms = 0;
    config
}

fn drain(rx: &mut UnboundedReceiver<ChatMessage>) -> Vec<ChatMessage> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

#[tokio::test]
async fn chat_round_trip() {
    let coordinator = Coordinator::new(ServerContext::new(config()).unwrap());

    let (alice_sink, mut alice) = ChannelSink::new();
    let (bob_sink, mut bob) = ChannelSink::new();
    assert!(coordinator.connect("alice", Arc::new(alice_sink)).await.accepted);
    assert!(coordinator.connect("bob", Arc::new(bob_sink)).await.accepted);

    assert_eq!(coordinator.join_route("alice", "general"), Some(vec![]));
    assert_eq!(
        coordinator.on_incoming_message("alice", "general", "hi bob"),
        Admission::accepted()
    );

    // Bob joins late and sees the history.
    let history = coordinator.join_route("bob", "general").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].payload, "hi bob");

    coordinator.on_incoming_message("bob", "general", "hey alice");
    assert_eq!(drain(&mut alice).len(), 2);
    assert_eq!(drain(&mut bob).len(), 1);

    coordinator.context().queue().wait_idle().await;
    let stats = coordinator.stats();
    assert_eq!(stats.message_queue.total, 0);
    assert_eq!(stats.connection_semaphore.in_use, 2);
    assert_eq!(stats.message_scheduler.total_load, 0);
    assert!(!stats.deadlock_detector.deadlock_detected);
    assert_eq!(coordinator.context().queue().metrics().delivered, 2);

    coordinator.context().shutdown().await;
}

#[tokio::test]
async fn undeliverable_messages_are_reported_and_dropped() {
    let observer = Arc::new(Exhausted::default());
    let context = ServerContext::builder(config())
        .delivery_handler(Arc::new(AlwaysFails))
        .delivery_observer(observer.clone())
        .build()
        .unwrap();
    let coordinator = Coordinator::new(context);

    for route in ["a", "b", "c"] {
        assert!(coordinator.on_incoming_message("sender", route, "lost").accepted);
    }
    coordinator.context().queue().wait_idle().await;

    let errors = observer.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 3);
    assert!(errors
        .iter()
        .all(|e| matches!(e, CoordinationError::DeliveryExhausted { attempts: 3, .. })));

    let queue = coordinator.context().queue();
    assert_eq!(queue.stats().total, 0);
    let metrics = queue.metrics();
    assert_eq!((metrics.delivered, metrics.retried, metrics.dropped), (0, 6, 3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_senders_on_one_route() {
    let coordinator = Coordinator::new(ServerContext::new(config()).unwrap());
    let (sink, mut rx) = ChannelSink::new();
    coordinator.connect("listener", Arc::new(sink)).await;
    coordinator.join_route("listener", "busy").unwrap();

    let sends = (0..32).map(|i| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator.on_incoming_message(&format!("user-{}", i), "busy", "ping")
        })
    });
    let replies: Vec<Admission> = futures::future::join_all(sends)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let accepted = replies.iter().filter(|r| r.accepted).count();
    assert!(accepted >= 1);
    assert_eq!(drain(&mut rx).len(), accepted);
    assert_eq!(coordinator.on_join_route("busy").len(), accepted);

    let state = coordinator.stats().deadlock_detector;
    assert!(state.resources.iter().all(|r| r.holder.is_none() && r.wait_queue.is_empty()));
}
