//! Cache configuration.

use std::time::Duration;

use serde::Deserialize;

// The TTL is the absolute staleness ceiling: entries expire even when
// invalidation misses a case.
const DEFAULT_TTL_SECONDS: u64 = 300;

/// Cache configuration from `bottega.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the read-path cache. Disabled, every read degrades to a miss
    /// and every write to a no-op.
    pub enabled: bool,
    /// Entry lifetime in seconds.
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttl_is_five_minutes() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.ttl(), Duration::from_secs(300));
    }
}
