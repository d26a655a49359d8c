//! Cache storage adapter.
//!
//! `CacheStore` is the boundary to the external key-value cache service.
//! Every operation is fallible and callers must tolerate failure: the
//! coordinator maps errors to miss/no-op. `MemoryCacheStore` is the
//! in-process backend used for single-node deployments and tests; a
//! networked store implements the same trait in larger deployments.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out")]
    Timeout,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a payload. `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheStoreError>;

    /// Store a payload with a bounded lifetime.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheStoreError>;

    /// Remove a key. Deleting an absent key is a no-op.
    async fn delete(&self, key: &str) -> Result<(), CacheStoreError>;
}

struct Entry {
    value: Bytes,
    expires_at: OffsetDateTime,
}

/// In-process TTL store over a concurrent map.
///
/// Expiry is lazy: an expired entry is dropped on the next read of its key.
/// `purge_expired` exists for long-running processes that want to reclaim
/// memory between reads.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, Entry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry past its deadline, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheStoreError> {
        let now = OffsetDateTime::now_utc();

        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }

        // Expired or absent; remove lazily outside the read guard.
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheStoreError> {
        let expires_at = OffsetDateTime::now_utc() + ttl;
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheStoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
