//! Four-level priority queue drained by a single delivery loop.
//!
//! URGENT > HIGH > NORMAL > LOW, FIFO by enqueue time inside a level. A
//! steady stream of urgent traffic starves the lower levels; that is
//! accepted, not mitigated.

pub mod buckets;
pub mod dispatch;
pub mod message;

pub use buckets::{PriorityBuckets, QueueStats};
pub use dispatch::{
    DeliveryHandler, DeliveryObserver, DispatchMetrics, PriorityDispatchQueue, SimulatedNetwork,
    TracingObserver,
};
pub use message::{Priority, QueuedMessage};

#[cfg(test)]
mod tests;
