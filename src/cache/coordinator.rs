//! Cache coordinator: typed read-through access and selective invalidation.
//!
//! Write paths call [`CacheCoordinator::invalidate`] after their repository
//! commit. Invalidation is best-effort and not transactional with the write;
//! the window between commit and deletion is bounded by the entry TTL.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::keys::{CacheKey, EntityKind, SpecialView};
use super::store::CacheStore;

const METRIC_CACHE_HIT: &str = "bottega_cache_hit_total";
const METRIC_CACHE_MISS: &str = "bottega_cache_miss_total";
const METRIC_CACHE_ERROR: &str = "bottega_cache_error_total";
const METRIC_CACHE_INVALIDATE: &str = "bottega_cache_invalidate_total";

pub struct CacheCoordinator {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
}

impl CacheCoordinator {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self { config, store }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl()
    }

    /// Fetch and deserialize a cached payload.
    ///
    /// Store failures and payloads that no longer deserialize (stale schema)
    /// degrade to a miss; neither ever fails the read path.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.config.enabled {
            return None;
        }

        let name = key.render();
        match self.store.get(&name).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    debug!(key = %name, "cache hit");
                    Some(value)
                }
                Err(err) => {
                    counter!(METRIC_CACHE_ERROR).increment(1);
                    warn!(key = %name, error = %err, "cached payload failed to decode, treating as miss");
                    None
                }
            },
            Ok(None) => {
                counter!(METRIC_CACHE_MISS).increment(1);
                debug!(key = %name, "cache miss");
                None
            }
            Err(err) => {
                counter!(METRIC_CACHE_ERROR).increment(1);
                warn!(key = %name, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Serialize and store a payload under the configured TTL. Best-effort.
    pub async fn put_json<T: Serialize>(&self, key: &CacheKey, value: &T) {
        if !self.config.enabled {
            return;
        }

        let name = key.render();
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                counter!(METRIC_CACHE_ERROR).increment(1);
                warn!(key = %name, error = %err, "payload serialization failed, skipping cache write");
                return;
            }
        };

        if let Err(err) = self.store.set(&name, bytes, self.config.ttl()).await {
            counter!(METRIC_CACHE_ERROR).increment(1);
            warn!(key = %name, error = %err, "cache write failed");
        } else {
            debug!(key = %name, "cache populated");
        }
    }

    /// Remove every key whose membership a mutation of `kind` could affect:
    /// the list key, the detail key when the id is known, and for products
    /// the featured/discounted special keys (a toggled flag or price change
    /// moves membership in those views).
    ///
    /// Deleting an absent key is a no-op, so concurrent writers invalidating
    /// the same entity need no locking.
    pub async fn invalidate(&self, kind: EntityKind, id: Option<i64>) {
        if !self.config.enabled {
            return;
        }

        let mut keys = vec![CacheKey::List(kind)];
        if let Some(id) = id {
            keys.push(CacheKey::Detail(kind, id));
        }
        if kind == EntityKind::Product {
            for view in SpecialView::ALL {
                keys.push(CacheKey::Special(kind, view));
            }
        }

        for key in keys {
            self.delete(&key).await;
        }
    }

    async fn delete(&self, key: &CacheKey) {
        let name = key.render();
        if let Err(err) = self.store.delete(&name).await {
            counter!(METRIC_CACHE_ERROR).increment(1);
            warn!(key = %name, error = %err, "cache invalidation failed, entry will expire by TTL");
        } else {
            counter!(METRIC_CACHE_INVALIDATE).increment(1);
            debug!(key = %name, "cache invalidated");
        }
    }
}
