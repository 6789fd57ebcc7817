//! Coordination core for a real-time chat server.
//!
//! Inbound messages are admitted through a [`deadlock::CycleGuard`],
//! prioritized by a [`queue::PriorityDispatchQueue`], cached in a
//! [`cache::ReplacementCache`], counted against a [`scheduler::LoadBalancer`]
//! and fanned out to recipients by the [`coordinator::Coordinator`].
//! Connections are gated by a [`sync::AdmissionSemaphore`].

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod deadlock;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod sync;
pub mod telemetry;

pub use config::ServerConfig;
pub use coordinator::{Admission, Coordinator, ServerContext};
pub use error::{CoordinationError, Result};
