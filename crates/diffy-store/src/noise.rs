//! Noise configuration storage

use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use diffy_model::{FieldPattern, NoiseRule};

/// Store of noisy field patterns per endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NoiseConfigStore: Send + Sync {
    /// Patterns configured for `endpoint`; empty when none are
    async fn get_noise_rules(&self, endpoint: &str) -> Result<Vec<FieldPattern>, StoreError>;

    /// Replace the patterns of `endpoint`
    async fn set_noise_rules(
        &self,
        endpoint: &str,
        patterns: Vec<FieldPattern>,
    ) -> Result<(), StoreError>;
}

/// In-memory noise store
#[derive(Debug, Default)]
pub struct InMemoryNoiseStore {
    rules: DashMap<String, Vec<FieldPattern>>,
}

impl InMemoryNoiseStore {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store seeded with `rules`; rules for the same endpoint merge
    #[must_use]
    pub fn from_rules(rules: impl IntoIterator<Item = NoiseRule>) -> Self {
        let store = Self::new();
        for rule in rules {
            let mut patterns = store.rules.entry(rule.endpoint).or_default();
            for pattern in rule.patterns {
                if !patterns.contains(&pattern) {
                    patterns.push(pattern);
                }
            }
        }
        store
    }

    /// Number of endpoints with rules
    #[inline]
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.rules.len()
    }
}

#[async_trait]
impl NoiseConfigStore for InMemoryNoiseStore {
    async fn get_noise_rules(&self, endpoint: &str) -> Result<Vec<FieldPattern>, StoreError> {
        Ok(self
            .rules
            .get(endpoint)
            .map(|patterns| patterns.clone())
            .unwrap_or_default())
    }

    async fn set_noise_rules(
        &self,
        endpoint: &str,
        patterns: Vec<FieldPattern>,
    ) -> Result<(), StoreError> {
        if patterns.is_empty() {
            self.rules.remove(endpoint);
        } else {
            self.rules.insert(endpoint.to_string(), patterns);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(texts: &[&str]) -> Vec<FieldPattern> {
        texts.iter().map(|t| t.parse().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_unknown_endpoint_has_no_rules() {
        let store = InMemoryNoiseStore::new();
        assert!(store.get_noise_rules("/missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_replaces_rules() {
        let store = InMemoryNoiseStore::new();
        store.set_noise_rules("/e", patterns(&["ts"])).await.unwrap();
        store
            .set_noise_rules("/e", patterns(&["meta.*", "id"]))
            .await
            .unwrap();
        assert_eq!(
            store.get_noise_rules("/e").await.unwrap(),
            patterns(&["meta.*", "id"])
        );

        store.set_noise_rules("/e", Vec::new()).await.unwrap();
        assert_eq!(store.endpoint_count(), 0);
    }

    #[tokio::test]
    async fn test_from_rules_merges_endpoints() {
        let store = InMemoryNoiseStore::from_rules([
            NoiseRule::new("/e", patterns(&["ts", "id"])),
            NoiseRule::new("/f", patterns(&["x"])),
            NoiseRule::new("/e", patterns(&["id", "host"])),
        ]);
        assert_eq!(store.endpoint_count(), 2);
        assert_eq!(
            store.get_noise_rules("/e").await.unwrap(),
            patterns(&["ts", "id", "host"])
        );
    }
}
