//! Store layer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Snapshot caching settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Seconds a configuration snapshot is served from cache
    pub snapshot_ttl_secs: u64,
    /// Maximum number of cached endpoint snapshots
    pub snapshot_capacity: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: 30,
            snapshot_capacity: 1024,
        }
    }
}

impl StoreConfig {
    /// Create default config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set snapshot TTL
    #[inline]
    #[must_use]
    pub fn with_snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_ttl_secs = ttl.as_secs();
        self
    }

    /// Set snapshot cache capacity
    #[inline]
    #[must_use]
    pub fn with_snapshot_capacity(mut self, capacity: u64) -> Self {
        self.snapshot_capacity = capacity;
        self
    }

    /// Snapshot TTL as a duration
    #[inline]
    #[must_use]
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_builders() {
        let config = StoreConfig::new()
            .with_snapshot_ttl(Duration::from_secs(5))
            .with_snapshot_capacity(8);
        assert_eq!(config.snapshot_ttl(), Duration::from_secs(5));
        assert_eq!(config.snapshot_capacity, 8);
    }

    #[test]
    fn test_store_config_partial_deserialize() {
        let config: StoreConfig = serde_json::from_str(r#"{"snapshot_ttl_secs":2}"#).unwrap();
        assert_eq!(config.snapshot_ttl_secs, 2);
        assert_eq!(config.snapshot_capacity, 1024);
    }
}
