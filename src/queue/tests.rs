//! Unit tests for priority ordering, drain behaviour and retry exhaustion.

use super::*;
use crate::error::{CoordinationError, DeliveryError};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Fails each message `failures` times, then records it as delivered.
#[derive(Default)]
struct FlakyHandler {
    failures: u32,
    attempts: Mutex<HashMap<Uuid, u32>>,
    delivered: Mutex<Vec<Uuid>>,
}

impl FlakyHandler {
    fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            ..Default::default()
        })
    }

    fn delivered(&self) -> Vec<Uuid> {
        self.delivered.lock().unwrap().clone()
    }

    fn attempts_for(&self, id: Uuid) -> u32 {
        self.attempts.lock().unwrap().get(&id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl DeliveryHandler for FlakyHandler {
    async fn deliver(&self, message: &QueuedMessage) -> Result<(), DeliveryError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(message.id).or_insert(0);
            *n += 1;
            *n
        };
        if attempt <= self.failures {
            return Err(DeliveryError::new("connection reset"));
        }
        self.delivered.lock().unwrap().push(message.id);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingObserver {
    exhausted: Mutex<Vec<(Uuid, CoordinationError)>>,
}

impl DeliveryObserver for RecordingObserver {
    fn delivery_exhausted(&self, message: &QueuedMessage, error: &CoordinationError) {
        self.exhausted.lock().unwrap().push((message.id, error.clone()));
    }
}

fn at(offset_ms: i64) -> chrono::DateTime<Utc> {
    Utc::now() + ChronoDuration::milliseconds(offset_ms)
}

#[test]
fn buckets_drain_by_priority_then_time() {
    let mut buckets = PriorityBuckets::new();
    let low = QueuedMessage::new("r", "low", Priority::Low).with_enqueued_at(at(1));
    let urgent_a = QueuedMessage::new("r", "u1", Priority::Urgent).with_enqueued_at(at(2));
    let normal = QueuedMessage::new("r", "n", Priority::Normal).with_enqueued_at(at(3));
    let urgent_b = QueuedMessage::new("r", "u2", Priority::Urgent).with_enqueued_at(at(4));
    for m in [low.clone(), urgent_a.clone(), normal.clone(), urgent_b.clone()] {
        buckets.push(m);
    }

    let order: Vec<Uuid> = std::iter::from_fn(|| buckets.pop()).map(|m| m.id).collect();
    assert_eq!(order, vec![urgent_a.id, urgent_b.id, normal.id, low.id]);
    assert!(buckets.is_empty());
}

#[test]
fn bucket_orders_by_timestamp_not_arrival() {
    let mut buckets = PriorityBuckets::new();
    let late = QueuedMessage::new("r", "late", Priority::High).with_enqueued_at(at(50));
    let early = QueuedMessage::new("r", "early", Priority::High).with_enqueued_at(at(10));
    let tie = QueuedMessage::new("r", "tie", Priority::High).with_enqueued_at(early.enqueued_at);
    buckets.push(late.clone());
    buckets.push(early.clone());
    buckets.push(tie.clone());

    assert_eq!(buckets.pop().map(|m| m.id), Some(early.id));
    assert_eq!(buckets.pop().map(|m| m.id), Some(tie.id));
    assert_eq!(buckets.pop().map(|m| m.id), Some(late.id));
}

#[test]
fn bucket_stats_count_each_level() {
    let mut buckets = PriorityBuckets::new();
    buckets.push(QueuedMessage::new("r", "a", Priority::Urgent));
    buckets.push(QueuedMessage::new("r", "b", Priority::Normal));
    buckets.push(QueuedMessage::new("r", "c", Priority::Normal));
    buckets.push(QueuedMessage::new("r", "d", Priority::Low));

    let stats = buckets.stats();
    assert_eq!(
        stats,
        QueueStats {
            urgent: 1,
            high: 0,
            normal: 2,
            low: 1,
            total: 4
        }
    );
    let json = serde_json::to_value(stats).unwrap();
    assert_eq!(json["normal"], 2);
    assert_eq!(json["total"], 4);
}

#[tokio::test]
async fn drain_delivers_in_priority_order() {
    let handler = FlakyHandler::failing(0);
    let queue = PriorityDispatchQueue::new(handler.clone(), Arc::new(TracingObserver), 3);

    let low = QueuedMessage::new("r", "low", Priority::Low);
    let urgent_a = QueuedMessage::new("r", "u1", Priority::Urgent);
    let normal = QueuedMessage::new("r", "n", Priority::Normal);
    let urgent_b = QueuedMessage::new("r", "u2", Priority::Urgent);
    let expected = vec![urgent_a.id, urgent_b.id, normal.id, low.id];

    // The drain task cannot run until this test yields, so all four are
    // queued before the first delivery.
    for m in [low, urgent_a, normal, urgent_b] {
        queue.submit(m);
    }
    assert_eq!(queue.stats().total, 4);
    assert!(queue.is_draining());

    queue.wait_idle().await;
    assert_eq!(handler.delivered(), expected);
    assert_eq!(queue.metrics().delivered, 4);
    assert!(queue.is_idle());
}

#[test]
fn submit_outside_runtime_holds_message_for_next_drain() {
    let handler = FlakyHandler::failing(0);
    let queue = PriorityDispatchQueue::new(handler.clone(), Arc::new(TracingObserver), 3);
    let early = QueuedMessage::new("r", "early", Priority::Normal);
    let early_id = early.id;

    queue.submit(early);
    assert!(!queue.is_draining());
    assert_eq!(queue.stats().total, 1);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let late = QueuedMessage::new("r", "late", Priority::Normal);
    let late_id = late.id;
    runtime.block_on(async {
        queue.submit(late);
        queue.wait_idle().await;
    });

    assert_eq!(handler.delivered(), vec![early_id, late_id]);
    assert!(queue.is_idle());
}

#[tokio::test]
async fn exhausted_messages_are_dropped_and_reported() {
    let handler = FlakyHandler::failing(3);
    let observer = Arc::new(RecordingObserver::default());
    let queue = PriorityDispatchQueue::new(handler.clone(), observer.clone(), 3);

    let messages: Vec<QueuedMessage> = (0..3)
        .map(|i| QueuedMessage::new("room", format!("m{i}"), Priority::Normal))
        .collect();
    for m in &messages {
        queue.submit(m.clone());
    }
    queue.wait_idle().await;

    let exhausted = observer.exhausted.lock().unwrap().clone();
    assert_eq!(exhausted.len(), 3);
    for m in &messages {
        assert_eq!(handler.attempts_for(m.id), 3);
        assert!(exhausted.iter().any(|(id, err)| *id == m.id
            && *err
                == CoordinationError::DeliveryExhausted {
                    message_id: m.id,
                    attempts: 3
                }));
    }
    assert!(handler.delivered().is_empty());
    assert_eq!(queue.stats().total, 0);
    assert_eq!(
        queue.metrics(),
        DispatchMetrics {
            delivered: 0,
            retried: 6,
            dropped: 3
        }
    );
}

#[tokio::test]
async fn transient_failures_are_retried_to_success() {
    let handler = FlakyHandler::failing(2);
    let observer = Arc::new(RecordingObserver::default());
    let queue = PriorityDispatchQueue::new(handler.clone(), observer.clone(), 3);

    let message = QueuedMessage::new("room", "hello", Priority::High);
    queue.submit(message.clone());
    queue.wait_idle().await;

    assert_eq!(handler.delivered(), vec![message.id]);
    assert_eq!(handler.attempts_for(message.id), 3);
    assert!(observer.exhausted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn drain_restarts_after_going_idle() {
    let handler = FlakyHandler::failing(0);
    let queue = PriorityDispatchQueue::new(handler.clone(), Arc::new(TracingObserver), 3);

    queue.submit(QueuedMessage::new("r", "first", Priority::Low));
    queue.wait_idle().await;
    queue.submit(QueuedMessage::new("r", "second", Priority::Low));
    queue.wait_idle().await;

    assert_eq!(handler.delivered().len(), 2);
}

/// Tracks how many deliveries overlap.
#[derive(Default)]
struct OverlapProbe {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    seen: AtomicUsize,
}

#[async_trait]
impl DeliveryHandler for OverlapProbe {
    async fn deliver(&self, _message: &QueuedMessage) -> Result<(), DeliveryError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submits_share_one_drain() {
    let probe = Arc::new(OverlapProbe::default());
    let queue = PriorityDispatchQueue::new(probe.clone(), Arc::new(TracingObserver), 3);

    let submitters: Vec<_> = (0..8)
        .map(|i| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                for j in 0..5 {
                    queue.submit(QueuedMessage::new("r", format!("{i}-{j}"), Priority::Normal));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for s in submitters {
        s.await.unwrap();
    }
    queue.wait_idle().await;

    assert_eq!(probe.seen.load(Ordering::SeqCst), 40);
    assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
}

#[test]
fn priority_wire_names() {
    assert_eq!(serde_json::to_string(&Priority::Urgent).unwrap(), "\"URGENT\"");
    assert_eq!(Priority::ALL.map(Priority::index), [0, 1, 2, 3]);
}
