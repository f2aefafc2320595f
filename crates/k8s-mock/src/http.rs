//! HTTP-based mock Kubernetes server using wiremock.
//!
//! This provides a real HTTP server that can be used with actual kubeconfig-based
//! connections. It serves discovery and read-only GETs of individual objects,
//! and can inject per-path failures and response latency.

use std::{
	collections::HashMap,
	io,
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::{json, Value};
use tracing::{debug, trace};
use wiremock::{
	matchers::{header_regex, method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::{
	discovery::{DiscoveryMode, MockApiResource, MockDiscovery},
	helpers::{api_path_for_manifest, is_object_path, parse_resource_path, status_body},
};

/// Objects served by GET, keyed by (collection path, name).
type ResourceMap = HashMap<(String, String), Value>;

/// A canned failure for one request path.
#[derive(Clone)]
pub struct MockFailure {
	path: String,
	status: u16,
	reason: String,
	message: String,
}

impl MockFailure {
	pub fn new(path: impl Into<String>, status: u16, reason: &str, message: &str) -> Self {
		Self {
			path: path.into(),
			status,
			reason: reason.to_string(),
			message: message.to_string(),
		}
	}

	pub fn forbidden(path: impl Into<String>) -> Self {
		Self::new(path, 403, "Forbidden", "access denied by mock server")
	}

	pub fn internal_error(path: impl Into<String>) -> Self {
		Self::new(path, 500, "InternalError", "internal error injected by mock server")
	}
}

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	#[builder(default)]
	discovery_mode: DiscoveryMode,
	/// Advertised API resources. Also used to derive object paths.
	#[builder(default)]
	discovery: MockDiscovery,
	/// Objects to serve as raw manifests. The server derives API paths from
	/// apiVersion/kind using the discovery data.
	#[builder(default)]
	resources: Vec<Value>,
	/// Requests to these paths fail instead of being served.
	#[builder(default)]
	failures: Vec<MockFailure>,
	/// Delay applied to every object GET.
	latency: Option<Duration>,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut resources = ResourceMap::new();
		for manifest in self.resources {
			if let Some((api_path, name)) = api_path_for_manifest(&manifest, &self.discovery) {
				trace!(api_path = %api_path, name = %name, "Registered resource");
				resources.insert((api_path, name), manifest);
			}
		}

		mount_discovery(&server, &self.discovery, self.discovery_mode).await;
		mount_failures(&server, &self.failures).await;
		mount_resources(&server, Arc::new(resources), self.latency).await;

		RunningHttpMockK8sServer { server }
	}
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}

	/// Write the kubeconfig into `dir` and return its path.
	///
	/// Written as JSON, which kubeconfig loaders accept as YAML.
	pub fn write_kubeconfig(&self, dir: &Path) -> io::Result<PathBuf> {
		let path = dir.join("kubeconfig");
		let body = serde_json::to_vec_pretty(&self.kubeconfig()).map_err(io::Error::other)?;
		std::fs::write(&path, body)?;
		Ok(path)
	}

	/// Paths of object GETs received so far, in arrival order. Discovery
	/// requests are not included.
	pub async fn object_requests(&self) -> Vec<String> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.into_iter()
			.map(|req| req.url.path().to_string())
			.filter(|p| is_object_path(p))
			.collect()
	}
}

async fn mount_failures(server: &MockServer, failures: &[MockFailure]) {
	for failure in failures {
		Mock::given(method("GET"))
			.and(path(failure.path.as_str()))
			.respond_with(
				ResponseTemplate::new(failure.status).set_body_json(status_body(
					failure.status,
					&failure.reason,
					&failure.message,
				)),
			)
			.with_priority(1)
			.mount(server)
			.await;
	}
}

async fn mount_resources(server: &MockServer, resources: Arc<ResourceMap>, latency: Option<Duration>) {
	Mock::given(method("GET"))
		.and(path_regex(r"^/api(s)?/.+/.+"))
		.respond_with(move |req: &Request| {
			let (api_path, name) = parse_resource_path(req.url.path());
			let response = match resources.get(&(api_path, name.clone())) {
				Some(resource) => ResponseTemplate::new(200).set_body_json(resource.clone()),
				None => ResponseTemplate::new(404).set_body_json(status_body(
					404,
					"NotFound",
					&format!("\"{name}\" not found"),
				)),
			};
			match latency {
				Some(delay) => response.set_delay(delay),
				None => response,
			}
		})
		.with_priority(10)
		.mount(server)
		.await;
}

fn aggregated_resource(group: &str, version: &str, r: &MockApiResource) -> Value {
	json!({
		"resource": r.name,
		"responseKind": {
			"group": group,
			"version": version,
			"kind": r.kind
		},
		"scope": r.scope(),
		"verbs": r.verbs,
	})
}

fn legacy_resource_list(group_version: &str, resources: &[MockApiResource]) -> Value {
	let resources: Vec<_> = resources
		.iter()
		.map(|r| {
			json!({
				"name": r.name,
				"singularName": "",
				"namespaced": r.namespaced,
				"kind": r.kind,
				"verbs": r.verbs,
			})
		})
		.collect();
	json!({
		"kind": "APIResourceList",
		"apiVersion": "v1",
		"groupVersion": group_version,
		"resources": resources
	})
}

async fn mount_discovery(server: &MockServer, discovery: &MockDiscovery, mode: DiscoveryMode) {
	// The Content-Type must indicate aggregated discovery format for clients to parse it
	const AGGREGATED_DISCOVERY_CONTENT_TYPE: &str =
		"application/json;g=apidiscovery.k8s.io;v=v2;as=APIGroupDiscoveryList";

	let groups = discovery.groups();

	match mode {
		DiscoveryMode::Aggregated => {
			let core: Vec<_> = discovery
				.core_resources()
				.iter()
				.map(|r| aggregated_resource("", "v1", r))
				.collect();
			let core_body = json!({
				"kind": "APIGroupDiscoveryList",
				"apiVersion": "apidiscovery.k8s.io/v2",
				"items": [{
					"metadata": {"name": ""},
					"versions": [{"version": "v1", "resources": core, "freshness": "Current"}]
				}]
			});

			let items: Vec<_> = groups
				.iter()
				.map(|(group, versions)| {
					// newest version first, matching server preference order
					let versions: Vec<_> = versions
						.iter()
						.rev()
						.map(|(version, resources)| {
							let resources: Vec<_> = resources
								.iter()
								.map(|r| aggregated_resource(group, version, r))
								.collect();
							json!({"version": version, "resources": resources, "freshness": "Current"})
						})
						.collect();
					json!({"metadata": {"name": group}, "versions": versions})
				})
				.collect();
			let apis_body = json!({
				"kind": "APIGroupDiscoveryList",
				"apiVersion": "apidiscovery.k8s.io/v2",
				"items": items
			});

			// set_body_raw keeps the aggregated Content-Type; set_body_json would overwrite it
			for (endpoint, body) in [("/api", core_body), ("/apis", apis_body)] {
				Mock::given(method("GET"))
					.and(path(endpoint))
					.and(header_regex("accept", "apidiscovery"))
					.respond_with(
						ResponseTemplate::new(200)
							.set_body_raw(body.to_string(), AGGREGATED_DISCOVERY_CONTENT_TYPE),
					)
					.with_priority(2)
					.mount(server)
					.await;
			}
		}
		DiscoveryMode::Legacy => {
			for endpoint in ["/api", "/apis"] {
				Mock::given(method("GET"))
					.and(path(endpoint))
					.and(header_regex("accept", "apidiscovery"))
					.respond_with(ResponseTemplate::new(406))
					.with_priority(2)
					.mount(server)
					.await;
			}
		}
	}

	// Legacy discovery endpoints (fallback)
	Mock::given(method("GET"))
		.and(path("/api"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"kind": "APIVersions",
			"versions": ["v1"],
			"serverAddressByClientCIDRs": []
		})))
		.with_priority(3)
		.mount(server)
		.await;

	let group_list: Vec<_> = groups
		.iter()
		.filter_map(|(group, versions)| {
			let versions: Vec<_> = versions
				.keys()
				.rev()
				.map(|v| json!({"groupVersion": format!("{group}/{v}"), "version": v}))
				.collect();
			let preferred = versions.first()?.clone();
			Some(json!({"name": group, "versions": versions, "preferredVersion": preferred}))
		})
		.collect();

	Mock::given(method("GET"))
		.and(path("/apis"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"kind": "APIGroupList",
			"apiVersion": "v1",
			"groups": group_list
		})))
		.with_priority(3)
		.mount(server)
		.await;

	Mock::given(method("GET"))
		.and(path("/api/v1"))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_json(legacy_resource_list("v1", discovery.core_resources())),
		)
		.with_priority(3)
		.mount(server)
		.await;

	for (group, versions) in &groups {
		for (version, resources) in versions {
			let gv = format!("{group}/{version}");
			Mock::given(method("GET"))
				.and(path(format!("/apis/{gv}")))
				.respond_with(
					ResponseTemplate::new(200).set_body_json(legacy_resource_list(&gv, resources)),
				)
				.with_priority(3)
				.mount(server)
				.await;
		}
	}
}
