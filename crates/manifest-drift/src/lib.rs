//! Drift detection between stored Kubernetes manifests and live cluster state.
//!
//! Stored manifests live in a [`ManifestStore`], live objects are read through
//! [`ClusterAccess`], and the [`DriftEngine`] ties resolution, fetching,
//! canonicalization and structural diffing together into per-manifest
//! [`DriftResult`]s and aggregated [`ScanResults`].

pub mod canonical;
pub mod classify;
pub mod client;
pub mod cluster;
pub mod config;
pub mod diff;
pub mod discovery;
pub mod fetch;
pub mod report;
pub mod resource;
pub mod scan;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

pub use canonical::Canonicalizer;
pub use classify::{DriftResult, DriftStatus, ParseError, StoredManifest};
pub use client::{ClusterConnection, ClusterTarget, ConnectionError};
pub use cluster::{ClusterAccess, ClusterError, KubeCluster};
pub use config::DriftConfig;
pub use diff::{ChangeType, DiffEntry, Differ};
pub use discovery::{DiscoveryError, KindRegistry};
pub use fetch::{FetchError, LiveFetcher};
pub use resource::{ResourceCoordinates, ResourceScope, ResourceTable, Resolver};
pub use scan::{DriftEngine, ScanError, ScanProgress, ScanResults};
pub use store::{DirectoryStore, ManifestFilter, ManifestRecord, ManifestStore, StoreError};
