//! Integration tests for cluster connection, discovery and live reads using
//! the HTTP mock server.

use assert_matches::assert_matches;
use k8s_mock::{
	collection_path, DiscoveryMode, HttpMockK8sServer, MockApiResource, MockDiscovery, MockFailure,
};
use manifest_drift::{
	ClusterAccess, ClusterConnection, ClusterError, ClusterTarget, ConnectionError, KindRegistry,
	KubeCluster, ResourceScope, Resolver,
};
use serde_json::json;

fn widget_discovery() -> MockDiscovery {
	MockDiscovery::default()
		.with_resources("example.com/v1", [MockApiResource::namespaced("widgets", "Widget")])
		.with_resources("example.com/v2", [MockApiResource::namespaced("widgets", "Widget")])
		.with_resources("example.com/v1", [MockApiResource::cluster_scoped("fleetset", "Fleet")])
}

#[tokio::test]
async fn test_connect_with_api_server() {
	let server = HttpMockK8sServer::builder().build().start().await;
	let target = ClusterTarget {
		api_server: Some(server.uri()),
		..ClusterTarget::default()
	};

	let conn = ClusterConnection::from_kubeconfig(&target, server.kubeconfig())
		.await
		.expect("connection should succeed");
	assert!(conn.cluster_identifier().contains("context:mock-context"));
}

#[tokio::test]
async fn test_connect_with_context() {
	let server = HttpMockK8sServer::builder().build().start().await;
	let target = ClusterTarget {
		context: Some("staging".to_string()),
		..ClusterTarget::default()
	};

	let conn = ClusterConnection::from_kubeconfig(&target, server.kubeconfig_with_context("staging"))
		.await
		.expect("connection should succeed");
	assert_eq!(conn.cluster_identifier(), "context:staging");
}

#[tokio::test]
async fn test_connect_from_kubeconfig_file() {
	let server = HttpMockK8sServer::builder().build().start().await;
	let temp = tempfile::TempDir::new().unwrap();
	let target = ClusterTarget {
		kubeconfig: Some(server.write_kubeconfig(temp.path()).unwrap()),
		..ClusterTarget::default()
	};

	let conn = ClusterConnection::connect(&target).await.expect("connection should succeed");
	assert_eq!(conn.cluster_identifier(), "context:mock-context");
}

#[tokio::test]
async fn test_connect_unknown_context_fails() {
	let server = HttpMockK8sServer::builder().build().start().await;
	let target = ClusterTarget {
		context: Some("production".to_string()),
		..ClusterTarget::default()
	};

	let result = ClusterConnection::from_kubeconfig(&target, server.kubeconfig()).await;
	assert_matches!(result, Err(ConnectionError::ContextNotFound(name)) if name == "production");
}

async fn test_discovery_impl(discovery_mode: DiscoveryMode) {
	let server = HttpMockK8sServer::builder()
		.discovery_mode(discovery_mode)
		.discovery(widget_discovery())
		.build()
		.start()
		.await;
	let conn = ClusterConnection::from_kubeconfig(&ClusterTarget::default(), server.kubeconfig())
		.await
		.unwrap();

	let registry = KindRegistry::discover(conn.client()).await.expect("discovery should succeed");

	assert_eq!(registry.lookup("example.com", "v2", "Widget").unwrap().plural, "widgets");
	assert_eq!(registry.lookup("apps", "v1", "deployment").unwrap().plural, "deployments");
	assert_eq!(
		registry.lookup("", "v1", "Namespace").unwrap().scope,
		ResourceScope::ClusterWide
	);
	// served at two versions, so not resolvable by kind alone
	assert_matches!(registry.lookup_kind("widget"), None);

	assert!(!Resolver::default().has_registry());
	let resolver = Resolver::default().with_registry(registry);
	assert!(resolver.has_registry());
	let fleet = resolver.resolve("fleet", None).expect("fleet is served by the cluster");
	assert_eq!(fleet.plural, "fleetset");
	assert_eq!(fleet.scope, ResourceScope::ClusterWide);
	assert_eq!(fleet.api_version(), "example.com/v1");
}

#[tokio::test]
async fn test_discovery_aggregated() {
	test_discovery_impl(DiscoveryMode::Aggregated).await;
}

#[tokio::test]
async fn test_discovery_legacy() {
	test_discovery_impl(DiscoveryMode::Legacy).await;
}

#[tokio::test]
async fn test_kube_cluster_reads() {
	let server = HttpMockK8sServer::builder()
		.resources(vec![
			json!({
				"apiVersion": "v1",
				"kind": "ConfigMap",
				"metadata": {"name": "settings", "namespace": "apps"},
				"data": {"mode": "fast"}
			}),
			json!({
				"apiVersion": "v1",
				"kind": "Namespace",
				"metadata": {"name": "apps"}
			}),
		])
		.failures(vec![MockFailure::forbidden(format!(
			"{}/locked",
			collection_path("v1", "configmaps", Some("apps"))
		))])
		.build()
		.start()
		.await;
	let conn = ClusterConnection::from_kubeconfig(&ClusterTarget::default(), server.kubeconfig())
		.await
		.unwrap();
	let cluster = KubeCluster::from_connection(&conn);
	let resolver = Resolver::default();
	let configmaps = resolver.resolve("cm", None).unwrap();
	let namespaces = resolver.resolve("ns", None).unwrap();

	let live = cluster
		.get(&configmaps, Some("apps"), "settings")
		.await
		.unwrap()
		.expect("configmap exists");
	assert_eq!(live["data"], json!({"mode": "fast"}));
	assert_eq!(live["metadata"]["name"], json!("settings"));

	let namespace = cluster.get(&namespaces, None, "apps").await.unwrap();
	assert!(namespace.is_some());

	let missing = cluster.get(&configmaps, Some("apps"), "absent").await.unwrap();
	assert_eq!(missing, None);

	let forbidden = cluster.get(&configmaps, Some("apps"), "locked").await;
	assert_matches!(forbidden, Err(ClusterError::Fetch { name, .. }) if name == "locked");

	assert_eq!(
		server.object_requests().await,
		vec![
			"/api/v1/namespaces/apps/configmaps/settings",
			"/api/v1/namespaces/apps",
			"/api/v1/namespaces/apps/configmaps/absent",
			"/api/v1/namespaces/apps/configmaps/locked",
		]
	);
}

#[tokio::test]
async fn test_unserved_resource_type_is_an_error() {
	let resolver = Resolver::default();
	// not in the built-in table, so the plural is guessed
	let endpoints = resolver.resolve("endpoints", Some("v1")).unwrap();
	assert_eq!(endpoints.plural, "endpointses");

	let server = HttpMockK8sServer::builder()
		.failures(vec![MockFailure::new(
			format!("{}/web", collection_path("v1", &endpoints.plural, Some("default"))),
			404,
			"NotFound",
			"the server could not find the requested resource",
		)])
		.build()
		.start()
		.await;
	let conn = ClusterConnection::from_kubeconfig(&ClusterTarget::default(), server.kubeconfig())
		.await
		.unwrap();
	let cluster = KubeCluster::from_connection(&conn);

	let result = cluster.get(&endpoints, Some("default"), "web").await;
	assert_matches!(result, Err(ClusterError::Fetch { name, .. }) if name == "web");
}
