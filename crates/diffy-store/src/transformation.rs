//! Transformation configuration storage
//!
//! Transformations are keyed by injection point. Declaration order matters:
//! it is the order in which chained transformations run.

use crate::error::StoreError;
use async_trait::async_trait;
use diffy_model::{InjectionPoint, Transformation};
use indexmap::IndexMap;
use parking_lot::RwLock;

/// Store of transformations by injection point
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransformationConfigStore: Send + Sync {
    /// Transformation attached to `injection_point`
    async fn get_transformation(
        &self,
        injection_point: &InjectionPoint,
    ) -> Result<Option<Transformation>, StoreError>;

    /// Insert or replace the transformation at its injection point
    async fn upsert(&self, transformation: Transformation) -> Result<(), StoreError>;

    /// All transformations in declaration order
    async fn list(&self) -> Result<Vec<Transformation>, StoreError>;
}

/// In-memory transformation store
///
/// Replacing a transformation keeps its original position.
#[derive(Debug, Default)]
pub struct InMemoryTransformationStore {
    entries: RwLock<IndexMap<InjectionPoint, Transformation>>,
}

impl InMemoryTransformationStore {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store seeded with `transformations` in order
    #[must_use]
    pub fn from_transformations(transformations: impl IntoIterator<Item = Transformation>) -> Self {
        let entries = transformations
            .into_iter()
            .map(|t| (t.injection_point.clone(), t))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Number of transformations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl TransformationConfigStore for InMemoryTransformationStore {
    async fn get_transformation(
        &self,
        injection_point: &InjectionPoint,
    ) -> Result<Option<Transformation>, StoreError> {
        Ok(self.entries.read().get(injection_point).cloned())
    }

    async fn upsert(&self, transformation: Transformation) -> Result<(), StoreError> {
        self.entries
            .write()
            .insert(transformation.injection_point.clone(), transformation);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Transformation>, StoreError> {
        Ok(self.entries.read().values().cloned().collect())
    }
}
