//! Bottega read-path cache.
//!
//! Caches list/detail/special reads for the two catalog entity kinds behind
//! an external key-value store with a TTL ceiling:
//!
//! - **Keys** (`keys`): typed key grammar plus the cache-eligibility
//!   predicate for list queries.
//! - **Store** (`store`): the `CacheStore` adapter boundary and the
//!   in-process TTL backend.
//! - **Coordinator** (`coordinator`): read-through get/put and best-effort
//!   selective invalidation.
//!
//! The store is treated as unreliable throughout: a failed read is a miss, a
//! failed write or delete is a logged no-op. Correctness never depends on
//! cache state; the TTL bounds staleness even when invalidation misses.

mod config;
mod coordinator;
mod keys;
mod store;

pub use config::CacheConfig;
pub use coordinator::CacheCoordinator;
pub use keys::{CacheKey, EntityKind, ListQuery, ListSort, SpecialView};
pub use store::{CacheStore, CacheStoreError, MemoryCacheStore};
