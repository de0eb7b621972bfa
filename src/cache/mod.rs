// In-process stock level cache. Instances are created from config and handed
// to the services that need them; there is no global cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use metrics::counter;
use uuid::Uuid;

use crate::config::CacheConfig;

/// Cache key for a stock level query: product plus optional location scope.
/// `None` for the location means "across all locations".
type StockKey = (Uuid, Option<Uuid>);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: i64,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: i64, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            Instant::now() > expires_at
        } else {
            false
        }
    }
}

/// Read-through cache for current stock levels.
///
/// Only "as of now" queries are cached; historical (cutoff) queries always go
/// to the movement store. Writers invalidate by product, which drops every
/// location scope for that product.
#[derive(Debug, Clone)]
pub struct StockCache {
    entries: Arc<DashMap<StockKey, CacheEntry>>,
    ttl: Option<Duration>,
    enabled: bool,
    capacity: usize,
}

impl StockCache {
    pub fn new(enabled: bool, capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
            enabled,
            capacity,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.enabled,
            config.capacity,
            config.default_ttl_secs.map(Duration::from_secs),
        )
    }

    /// A cache that stores nothing. Lookups always miss.
    pub fn disabled() -> Self {
        Self::new(false, 0, None)
    }

    pub fn get(&self, product_id: Uuid, location_id: Option<Uuid>) -> Option<i64> {
        if !self.enabled {
            return None;
        }
        let key = (product_id, location_id);
        if let Some(entry) = self.entries.get(&key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(&key);
                counter!("stockledger_cache.misses", 1);
                None
            } else {
                counter!("stockledger_cache.hits", 1);
                Some(entry.value)
            }
        } else {
            counter!("stockledger_cache.misses", 1);
            None
        }
    }

    pub fn put(&self, product_id: Uuid, location_id: Option<Uuid>, value: i64) {
        if !self.enabled {
            return;
        }
        let key = (product_id, location_id);
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.cleanup();
            if self.entries.len() >= self.capacity {
                // Still full of live entries; skip rather than evict at random.
                return;
            }
        }
        self.entries.insert(key, CacheEntry::new(value, self.ttl));
    }

    /// Drops every cached level for the product, across all location scopes.
    /// Called after any movement touching the product is committed.
    pub fn invalidate_product(&self, product_id: Uuid) {
        self.entries.retain(|key, _| key.0 != product_id);
        counter!("stockledger_cache.invalidations", 1);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn cleanup(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}
