//! Round-robin worker accounting for in-flight message handling.
//! Assignment is advisory: a saturated pool never blocks delivery.

pub mod balancer;
pub mod worker;

pub use balancer::{LoadBalancer, SchedulerStats};
pub use worker::{Worker, WorkerId, WorkerStats};
