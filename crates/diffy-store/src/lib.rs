//! Diffy stores and analysis service
//!
//! Persistence and configuration plumbing around the analysis engine:
//!
//! - [`ResultStore`]: immutable difference results, in memory or as a JSON
//!   lines file
//! - [`NoiseConfigStore`] and [`TransformationConfigStore`]: per-endpoint
//!   noise patterns and transformations by injection point
//! - [`SnapshotProvider`]: cached configuration snapshots with last known
//!   good fallback
//! - [`AnalysisService`]: snapshot, analyze and save in one call

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod noise;
pub mod result;
pub mod service;
pub mod snapshot;
pub mod transformation;

pub use config::StoreConfig;
pub use error::{ServiceError, StoreError};
pub use noise::{InMemoryNoiseStore, NoiseConfigStore};
pub use result::{InMemoryResultStore, JsonlResultStore, ResultStore};
pub use service::AnalysisService;
pub use snapshot::SnapshotProvider;
pub use transformation::{InMemoryTransformationStore, TransformationConfigStore};
