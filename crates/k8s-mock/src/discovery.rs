//! Mock Kubernetes API discovery types.

use std::collections::BTreeMap;

/// Discovery mode for the mock server.
#[derive(Clone, Copy, Default)]
pub enum DiscoveryMode {
	/// Support aggregated discovery (APIGroupDiscoveryList).
	#[default]
	Aggregated,
	/// Return 406 for aggregated discovery, forcing fallback to legacy endpoints.
	Legacy,
}

/// Resources advertised by the mock server, keyed by group/version
/// (`v1` for the core group).
#[derive(Clone)]
pub struct MockDiscovery {
	resources: BTreeMap<String, Vec<MockApiResource>>,
}

impl Default for MockDiscovery {
	fn default() -> Self {
		Self::empty()
			.with_resources(
				"v1",
				[
					MockApiResource::namespaced("configmaps", "ConfigMap"),
					MockApiResource::namespaced("secrets", "Secret"),
					MockApiResource::namespaced("services", "Service"),
					MockApiResource::namespaced("serviceaccounts", "ServiceAccount"),
					MockApiResource::namespaced("pods", "Pod"),
					MockApiResource::cluster_scoped("namespaces", "Namespace"),
				],
			)
			.with_resources(
				"apps/v1",
				[
					MockApiResource::namespaced("deployments", "Deployment"),
					MockApiResource::namespaced("statefulsets", "StatefulSet"),
					MockApiResource::namespaced("daemonsets", "DaemonSet"),
				],
			)
			.with_resources(
				"networking.k8s.io/v1",
				[MockApiResource::namespaced("ingresses", "Ingress")],
			)
			.with_resources(
				"rbac.authorization.k8s.io/v1",
				[MockApiResource::cluster_scoped("clusterroles", "ClusterRole")],
			)
	}
}

impl MockDiscovery {
	/// No resources at all, not even the core group.
	pub fn empty() -> Self {
		Self {
			resources: BTreeMap::new(),
		}
	}

	/// Advertise additional resources under `group_version`.
	#[must_use]
	pub fn with_resources(
		mut self,
		group_version: &str,
		resources: impl IntoIterator<Item = MockApiResource>,
	) -> Self {
		self.resources
			.entry(group_version.to_string())
			.or_default()
			.extend(resources);
		self
	}

	/// Core (`v1`) resources.
	pub fn core_resources(&self) -> &[MockApiResource] {
		self.resources.get("v1").map_or(&[], Vec::as_slice)
	}

	/// Non-core resources grouped by group name, then version.
	pub fn groups(&self) -> BTreeMap<&str, BTreeMap<&str, &[MockApiResource]>> {
		let mut groups: BTreeMap<&str, BTreeMap<&str, &[MockApiResource]>> = BTreeMap::new();
		for (gv, resources) in &self.resources {
			if let Some((group, version)) = gv.split_once('/') {
				groups
					.entry(group)
					.or_default()
					.insert(version, resources.as_slice());
			}
		}
		groups
	}

	/// Find the resource serving `kind` at `api_version`.
	pub fn find(&self, api_version: &str, kind: &str) -> Option<&MockApiResource> {
		self.resources
			.get(api_version)?
			.iter()
			.find(|r| r.kind == kind)
	}
}

/// A mock API resource definition.
#[derive(Clone)]
pub struct MockApiResource {
	pub name: String,
	pub kind: String,
	pub namespaced: bool,
	pub verbs: Vec<String>,
}

impl MockApiResource {
	pub fn namespaced(name: &str, kind: &str) -> Self {
		Self::new(name, kind, true)
	}

	pub fn cluster_scoped(name: &str, kind: &str) -> Self {
		Self::new(name, kind, false)
	}

	fn new(name: &str, kind: &str, namespaced: bool) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced,
			verbs: vec!["get".into(), "list".into(), "watch".into()],
		}
	}

	pub(crate) fn scope(&self) -> &'static str {
		if self.namespaced {
			"Namespaced"
		} else {
			"Cluster"
		}
	}
}
