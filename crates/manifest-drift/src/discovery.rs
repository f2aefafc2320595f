//! Kind registry built from the cluster's discovery API.
//!
//! The registry records which (group, version, kind) triples the cluster
//! actually serves together with their plural resource name and scope, so
//! custom resources resolve without a static table entry.

use std::collections::HashMap;

use kube::{
	discovery::{ApiResource, Scope},
	Client, Discovery,
};
use thiserror::Error;
use tracing::instrument;

use crate::resource::ResourceScope;

/// Errors that can occur during API resource discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("full API discovery failed")]
	FullDiscovery(#[source] kube::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RegistryKey {
	group: String,
	version: String,
	kind: String,
}

impl RegistryKey {
	fn new(group: &str, version: &str, kind: &str) -> Self {
		Self {
			group: group.to_string(),
			version: version.to_string(),
			kind: kind.to_lowercase(),
		}
	}
}

/// A kind served by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredKind {
	pub plural: String,
	pub scope: ResourceScope,
}

/// Lookup table of (group, version, kind) served by the cluster.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
	entries: HashMap<RegistryKey, RegisteredKind>,
}

impl KindRegistry {
	/// Query the cluster's discovery API.
	///
	/// Uses the Aggregated Discovery API (K8s 1.26+) which requires only 2 API
	/// calls, falling back to full per-group discovery on older clusters.
	#[instrument(skip(client))]
	pub async fn discover(client: &Client) -> Result<Self, DiscoveryError> {
		match Discovery::new(client.clone()).run_aggregated().await {
			Ok(discovery) => {
				tracing::debug!("using aggregated discovery");
				Ok(Self::from_discovery(&discovery))
			}
			Err(e) => {
				tracing::debug!(error = %e, "aggregated discovery not available; using full discovery");
				let discovery = Discovery::new(client.clone())
					.run()
					.await
					.map_err(DiscoveryError::FullDiscovery)?;
				Ok(Self::from_discovery(&discovery))
			}
		}
	}

	fn from_discovery(discovery: &Discovery) -> Self {
		let mut registry = Self::default();
		for group in discovery.groups() {
			// All served versions, not just the preferred one, so manifests
			// pinned to an older version still resolve.
			for ver in group.versions() {
				for (ar, caps) in group.versioned_resources(ver) {
					let scope = match caps.scope {
						Scope::Namespaced => ResourceScope::Namespaced,
						Scope::Cluster => ResourceScope::ClusterWide,
					};
					registry.insert_api_resource(&ar, scope);
				}
			}
		}
		tracing::debug!(kinds = registry.len(), "built kind registry from discovery");
		registry
	}

	fn insert_api_resource(&mut self, ar: &ApiResource, scope: ResourceScope) {
		self.entries.insert(
			RegistryKey::new(&ar.group, &ar.version, &ar.kind),
			RegisteredKind {
				plural: ar.plural.clone(),
				scope,
			},
		);
	}

	/// Build a registry from (group, version, kind, plural, scope) tuples.
	pub fn from_entries<'a>(
		entries: impl IntoIterator<Item = (&'a str, &'a str, &'a str, &'a str, ResourceScope)>,
	) -> Self {
		Self {
			entries: entries
				.into_iter()
				.map(|(group, version, kind, plural, scope)| {
					(
						RegistryKey::new(group, version, kind),
						RegisteredKind {
							plural: plural.to_string(),
							scope,
						},
					)
				})
				.collect(),
		}
	}

	/// Exact lookup. `kind` is matched case-insensitively.
	pub fn lookup(&self, group: &str, version: &str, kind: &str) -> Option<&RegisteredKind> {
		self.entries.get(&RegistryKey::new(group, version, kind))
	}

	/// Lookup by kind alone. Only succeeds when exactly one group/version
	/// serves the kind.
	pub fn lookup_kind(&self, kind: &str) -> Option<(&str, &str, &RegisteredKind)> {
		let kind = kind.to_lowercase();
		let mut matches = self.entries.iter().filter(|(key, _)| key.kind == kind);
		let (key, registered) = matches.next()?;
		if matches.next().is_some() {
			tracing::debug!(%kind, "kind served by multiple group/versions; not resolving by kind alone");
			return None;
		}
		Some((key.group.as_str(), key.version.as_str(), registered))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
