//! Counting permits with FIFO handoff, and an owner-checked mutex built on
//! the same pool.

mod pool;
pub mod mutex;
pub mod semaphore;

pub use mutex::OwnershipMutex;
pub use semaphore::{AdmissionSemaphore, SemaphoreStats};
