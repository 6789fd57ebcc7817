//! Bounded key → value cache with least-recently-used replacement.
//! Backs route-log replay so joining a busy conversation does not hit
//! the backing store every time.

pub mod entry;
pub mod replacement;

pub use entry::CacheEntry;
pub use replacement::{CacheStats, ReplacementCache};
