//! Resource-allocation graph over requesters ("processes") and contended
//! keys ("resources"). A request that would close a circular wait is
//! refused instead of queued.

pub mod graph;
pub mod guard;

pub use graph::{AllocationSnapshot, GraphNode, ProcessNode, ProcessView, ResourceNode, ResourceView};
pub use guard::{CycleGuard, ReleaseOutcome, RequestOutcome};
