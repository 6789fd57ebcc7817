//! A single cached value plus its access bookkeeping and recency links.

use chrono::{DateTime, Utc};

/// Internal representation of one cached (key, value) pair.
///
/// Links are arena indices into the owning cache, not references.
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub value: V,
    pub last_access: DateTime<Utc>,
    pub access_count: u64,
    pub(super) prev: Option<usize>, // toward most-recent
    pub(super) next: Option<usize>, // toward least-recent
}

impl<K, V> CacheEntry<K, V> {
    pub(super) fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            last_access: Utc::now(),
            access_count: 0,
            prev: None,
            next: None,
        }
    }

    pub(super) fn record_access(&mut self) {
        self.last_access = Utc::now();
        self.access_count += 1;
    }
}
