//! Resource-type resolution.
//!
//! Maps the user-facing kind names used in the manifest store (`deployment`,
//! `deploy`, `svc`, ...) to the API coordinates needed to read the live
//! object: group, version, plural resource name and scope.

use std::{
	collections::{HashMap, HashSet},
	fmt,
	sync::Arc,
};

use phf::{phf_map, phf_set};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::discovery::KindRegistry;

/// Whether a resource lives inside a namespace or at cluster level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceScope {
	Namespaced,
	ClusterWide,
}

/// Canonical kind -> (group, version, plural).
static BUILTIN_KINDS: phf::Map<&'static str, (&'static str, &'static str, &'static str)> = phf_map! {
	"pod" => ("", "v1", "pods"),
	"service" => ("", "v1", "services"),
	"configmap" => ("", "v1", "configmaps"),
	"secret" => ("", "v1", "secrets"),
	"namespace" => ("", "v1", "namespaces"),
	"persistentvolumeclaim" => ("", "v1", "persistentvolumeclaims"),
	"persistentvolume" => ("", "v1", "persistentvolumes"),
	"serviceaccount" => ("", "v1", "serviceaccounts"),
	"deployment" => ("apps", "v1", "deployments"),
	"statefulset" => ("apps", "v1", "statefulsets"),
	"daemonset" => ("apps", "v1", "daemonsets"),
	"replicaset" => ("apps", "v1", "replicasets"),
	"job" => ("batch", "v1", "jobs"),
	"cronjob" => ("batch", "v1", "cronjobs"),
	"ingress" => ("networking.k8s.io", "v1", "ingresses"),
	"ingressclass" => ("networking.k8s.io", "v1", "ingressclasses"),
	"networkpolicy" => ("networking.k8s.io", "v1", "networkpolicies"),
	"role" => ("rbac.authorization.k8s.io", "v1", "roles"),
	"rolebinding" => ("rbac.authorization.k8s.io", "v1", "rolebindings"),
	"clusterrole" => ("rbac.authorization.k8s.io", "v1", "clusterroles"),
	"clusterrolebinding" => ("rbac.authorization.k8s.io", "v1", "clusterrolebindings"),
	"horizontalpodautoscaler" => ("autoscaling", "v2", "horizontalpodautoscalers"),
	"poddisruptionbudget" => ("policy", "v1", "poddisruptionbudgets"),
	"storageclass" => ("storage.k8s.io", "v1", "storageclasses"),
	"customresourcedefinition" => ("apiextensions.k8s.io", "v1", "customresourcedefinitions"),
	"gateway" => ("gateway.networking.k8s.io", "v1", "gateways"),
	"gatewayclass" => ("gateway.networking.k8s.io", "v1", "gatewayclasses"),
	"httproute" => ("gateway.networking.k8s.io", "v1", "httproutes"),
	"grpcroute" => ("gateway.networking.k8s.io", "v1", "grpcroutes"),
	"tcproute" => ("gateway.networking.k8s.io", "v1", "tcproutes"),
	"udproute" => ("gateway.networking.k8s.io", "v1", "udproutes"),
	"tlsroute" => ("gateway.networking.k8s.io", "v1", "tlsroutes"),
	"referencegrant" => ("gateway.networking.k8s.io", "v1beta1", "referencegrants"),
	"certificate" => ("cert-manager.io", "v1", "certificates"),
	"certificaterequest" => ("cert-manager.io", "v1", "certificaterequests"),
	"issuer" => ("cert-manager.io", "v1", "issuers"),
	"clusterissuer" => ("cert-manager.io", "v1", "clusterissuers"),
};

/// Short names and plurals -> canonical kind.
static BUILTIN_ALIASES: phf::Map<&'static str, &'static str> = phf_map! {
	"po" => "pod",
	"pods" => "pod",
	"svc" => "service",
	"services" => "service",
	"cm" => "configmap",
	"configmaps" => "configmap",
	"secrets" => "secret",
	"ns" => "namespace",
	"namespaces" => "namespace",
	"pvc" => "persistentvolumeclaim",
	"persistentvolumeclaims" => "persistentvolumeclaim",
	"pv" => "persistentvolume",
	"persistentvolumes" => "persistentvolume",
	"sa" => "serviceaccount",
	"serviceaccounts" => "serviceaccount",
	"deploy" => "deployment",
	"deployments" => "deployment",
	"sts" => "statefulset",
	"statefulsets" => "statefulset",
	"ds" => "daemonset",
	"daemonsets" => "daemonset",
	"rs" => "replicaset",
	"replicasets" => "replicaset",
	"jobs" => "job",
	"cj" => "cronjob",
	"cronjobs" => "cronjob",
	"ing" => "ingress",
	"ingresses" => "ingress",
	"ingressclasses" => "ingressclass",
	"netpol" => "networkpolicy",
	"networkpolicies" => "networkpolicy",
	"roles" => "role",
	"rolebindings" => "rolebinding",
	"clusterroles" => "clusterrole",
	"clusterrolebindings" => "clusterrolebinding",
	"hpa" => "horizontalpodautoscaler",
	"horizontalpodautoscalers" => "horizontalpodautoscaler",
	"pdb" => "poddisruptionbudget",
	"poddisruptionbudgets" => "poddisruptionbudget",
	"sc" => "storageclass",
	"storageclasses" => "storageclass",
	"crd" => "customresourcedefinition",
	"crds" => "customresourcedefinition",
	"customresourcedefinitions" => "customresourcedefinition",
	"gw" => "gateway",
	"gateways" => "gateway",
	"gc" => "gatewayclass",
	"gatewayclasses" => "gatewayclass",
	"httproutes" => "httproute",
	"grpcroutes" => "grpcroute",
	"tcproutes" => "tcproute",
	"udproutes" => "udproute",
	"tlsroutes" => "tlsroute",
	"referencegrants" => "referencegrant",
	"cert" => "certificate",
	"certs" => "certificate",
	"certificates" => "certificate",
	"cr" => "certificaterequest",
	"certificaterequests" => "certificaterequest",
	"issuers" => "issuer",
	"clusterissuers" => "clusterissuer",
};

static BUILTIN_CLUSTER_SCOPED: phf::Set<&'static str> = phf_set! {
	"namespace",
	"persistentvolume",
	"clusterrole",
	"clusterrolebinding",
	"clusterissuer",
	"gatewayclass",
	"ingressclass",
	"storageclass",
	"customresourcedefinition",
};

/// Pinned group, version and plural for a kind the table knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownKind {
	pub group: String,
	pub version: String,
	pub plural: String,
}

impl KnownKind {
	pub fn new(group: impl Into<String>, version: impl Into<String>, plural: impl Into<String>) -> Self {
		Self {
			group: group.into(),
			version: version.into(),
			plural: plural.into(),
		}
	}
}

/// Static kind table: aliases, known kinds and the cluster-scoped set.
///
/// Keys are stored lowercase; all lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct ResourceTable {
	aliases: HashMap<String, String>,
	kinds: HashMap<String, KnownKind>,
	cluster_scoped: HashSet<String>,
}

impl ResourceTable {
	/// Table with the built-in core, workload, networking, RBAC, gateway
	/// and certificate kinds.
	pub fn builtin() -> Self {
		Self {
			aliases: BUILTIN_ALIASES
				.entries()
				.map(|(alias, kind)| ((*alias).to_string(), (*kind).to_string()))
				.collect(),
			kinds: BUILTIN_KINDS
				.entries()
				.map(|(kind, (group, version, plural))| {
					((*kind).to_string(), KnownKind::new(*group, *version, *plural))
				})
				.collect(),
			cluster_scoped: BUILTIN_CLUSTER_SCOPED
				.iter()
				.map(|kind| (*kind).to_string())
				.collect(),
		}
	}

	/// Register an alias for a canonical kind.
	#[must_use]
	pub fn with_alias(mut self, alias: &str, kind: &str) -> Self {
		self.aliases.insert(alias.to_lowercase(), kind.to_lowercase());
		self
	}

	/// Register (or override) a known kind.
	#[must_use]
	pub fn with_kind(mut self, kind: &str, known: KnownKind, scope: ResourceScope) -> Self {
		let kind = kind.to_lowercase();
		match scope {
			ResourceScope::ClusterWide => self.cluster_scoped.insert(kind.clone()),
			ResourceScope::Namespaced => self.cluster_scoped.remove(&kind),
		};
		self.kinds.insert(kind, known);
		self
	}

	/// Map a user-facing kind name to its canonical lowercase form.
	///
	/// Names that are neither an alias nor a known kind are returned
	/// lowercased and otherwise unchanged.
	pub fn canonical_kind(&self, name: &str) -> String {
		let lower = name.trim().to_lowercase();
		match self.aliases.get(&lower) {
			Some(kind) => kind.clone(),
			None => lower,
		}
	}

	pub fn lookup(&self, canonical_kind: &str) -> Option<&KnownKind> {
		self.kinds.get(canonical_kind)
	}

	pub fn scope_of(&self, canonical_kind: &str) -> ResourceScope {
		if self.cluster_scoped.contains(canonical_kind) {
			ResourceScope::ClusterWide
		} else {
			ResourceScope::Namespaced
		}
	}

	pub fn len(&self) -> usize {
		self.kinds.len()
	}

	pub fn is_empty(&self) -> bool {
		self.kinds.is_empty()
	}
}

/// Fully resolved API coordinates for a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceCoordinates {
	pub group: String,
	pub version: String,
	pub plural: String,
	/// Canonical lowercase kind.
	pub kind: String,
	pub scope: ResourceScope,
}

impl ResourceCoordinates {
	/// `group/version`, or just `version` for the core group.
	pub fn api_version(&self) -> String {
		if self.group.is_empty() {
			self.version.clone()
		} else {
			format!("{}/{}", self.group, self.version)
		}
	}

	pub fn is_namespaced(&self) -> bool {
		self.scope == ResourceScope::Namespaced
	}
}

impl fmt::Display for ResourceCoordinates {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.group.is_empty() {
			write!(f, "{}.{}", self.plural, self.version)
		} else {
			write!(f, "{}.{}.{}", self.plural, self.version, self.group)
		}
	}
}

/// Split an apiVersion into (group, version). `v1` belongs to the core group.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
	match api_version.split_once('/') {
		Some((group, version)) => (group, version),
		None => ("", api_version),
	}
}

/// English pluralization used for kinds nothing else knows about.
pub fn pluralize(kind: &str) -> String {
	let lower = kind.to_lowercase();
	if ["s", "x", "ch", "sh"].iter().any(|suffix| lower.ends_with(suffix)) {
		return format!("{lower}es");
	}
	if let Some(stem) = lower.strip_suffix('y') {
		if stem.chars().last().is_some_and(|c| !"aeiou".contains(c)) {
			return format!("{stem}ies");
		}
	}
	format!("{lower}s")
}

/// Resolves kind names to [`ResourceCoordinates`].
///
/// Sources are consulted in order: the cluster's discovery registry (when
/// one was loaded), the static [`ResourceTable`], then heuristic
/// pluralization when an explicit apiVersion is available.
#[derive(Debug, Clone)]
pub struct Resolver {
	table: Arc<ResourceTable>,
	registry: Option<Arc<KindRegistry>>,
}

impl Default for Resolver {
	fn default() -> Self {
		Self::new(ResourceTable::builtin())
	}
}

impl Resolver {
	pub fn new(table: ResourceTable) -> Self {
		Self {
			table: Arc::new(table),
			registry: None,
		}
	}

	/// Prefer kinds served by the cluster over the static table.
	#[must_use]
	pub fn with_registry(mut self, registry: KindRegistry) -> Self {
		self.registry = Some(Arc::new(registry));
		self
	}

	pub fn has_registry(&self) -> bool {
		self.registry.is_some()
	}

	/// Resolve a kind name, optionally pinned to the stored manifest's apiVersion.
	///
	/// An explicit apiVersion overrides the table's group/version while keeping
	/// its plural. Returns `None` for a kind that is unknown everywhere and
	/// has no apiVersion to go on.
	#[instrument(level = "debug", skip(self))]
	pub fn resolve(&self, kind: &str, api_version: Option<&str>) -> Option<ResourceCoordinates> {
		let canonical = self.table.canonical_kind(kind);
		let explicit = api_version
			.map(str::trim)
			.filter(|v| !v.is_empty())
			.map(split_api_version);

		if let Some(coordinates) = self.resolve_from_registry(&canonical, explicit) {
			tracing::debug!(resource = %coordinates, "resolved from cluster discovery");
			return Some(coordinates);
		}

		let scope = self.table.scope_of(&canonical);
		let (group, version, plural) = match (self.table.lookup(&canonical), explicit) {
			(Some(known), None) => (
				known.group.clone(),
				known.version.clone(),
				known.plural.clone(),
			),
			(Some(known), Some((group, version))) => {
				(group.to_string(), version.to_string(), known.plural.clone())
			}
			(None, Some((group, version))) => {
				let plural = pluralize(&canonical);
				tracing::warn!(
					kind = %canonical,
					api_version = api_version.unwrap_or_default(),
					plural = %plural,
					"kind not known to discovery or the resource table; guessing plural"
				);
				(group.to_string(), version.to_string(), plural)
			}
			(None, None) => {
				tracing::debug!(kind = %canonical, "unknown kind without apiVersion");
				return None;
			}
		};

		Some(ResourceCoordinates {
			group,
			version,
			plural,
			kind: canonical,
			scope,
		})
	}

	fn resolve_from_registry(
		&self,
		canonical: &str,
		explicit: Option<(&str, &str)>,
	) -> Option<ResourceCoordinates> {
		let registry = self.registry.as_ref()?;
		let (group, version, registered) = match explicit {
			Some((group, version)) => (group, version, registry.lookup(group, version, canonical)?),
			// A table entry pins the version, so only fall through to a
			// kind-only registry match for kinds the table does not know.
			None if self.table.lookup(canonical).is_none() => registry.lookup_kind(canonical)?,
			None => return None,
		};
		Some(ResourceCoordinates {
			group: group.to_string(),
			version: version.to_string(),
			plural: registered.plural.clone(),
			kind: canonical.to_string(),
			scope: registered.scope,
		})
	}
}
