//! Path and response helpers for the mock server.

use serde_json::{json, Value};

use crate::discovery::MockDiscovery;

/// `metav1.Status` failure body, as returned by a real API server.
pub fn status_body(code: u16, reason: &str, message: &str) -> Value {
	json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	})
}

/// Collection path for a resource, e.g. `/apis/apps/v1/namespaces/default/deployments`.
pub fn collection_path(api_version: &str, plural: &str, namespace: Option<&str>) -> String {
	let root = if api_version.contains('/') {
		format!("/apis/{api_version}")
	} else {
		format!("/api/{api_version}")
	};
	match namespace {
		Some(ns) => format!("{root}/namespaces/{ns}/{plural}"),
		None => format!("{root}/{plural}"),
	}
}

/// Derive (collection path, name) for a manifest using discovery data.
///
/// Namespaced objects without a namespace land in `default`.
pub fn api_path_for_manifest(manifest: &Value, discovery: &MockDiscovery) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let metadata = manifest.get("metadata")?;
	let name = metadata.get("name")?.as_str()?.to_string();

	let resource = discovery.find(api_version, kind)?;
	let namespace = resource.namespaced.then(|| {
		metadata
			.get("namespace")
			.and_then(Value::as_str)
			.unwrap_or("default")
	});

	Some((collection_path(api_version, &resource.name, namespace), name))
}

/// Split a request path into (collection path, name).
///
/// - `/api/v1/namespaces/default/configmaps/my-config` -> (`/api/v1/namespaces/default/configmaps`, `my-config`)
/// - `/api/v1/namespaces/my-ns` -> (`/api/v1/namespaces`, `my-ns`)
pub fn parse_resource_path(path: &str) -> (String, String) {
	let path = path.trim_end_matches('/');
	match path.rsplit_once('/') {
		Some((collection, name)) => (collection.to_string(), name.to_string()),
		None => (path.to_string(), String::new()),
	}
}

/// Whether `path` addresses an object rather than a discovery document.
pub fn is_object_path(path: &str) -> bool {
	let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
	match segments.first() {
		Some(&"api") => segments.len() >= 4,
		Some(&"apis") => segments.len() >= 5,
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_collection_path() {
		assert_eq!(
			collection_path("apps/v1", "deployments", Some("web")),
			"/apis/apps/v1/namespaces/web/deployments"
		);
		assert_eq!(collection_path("v1", "namespaces", None), "/api/v1/namespaces");
	}

	#[test]
	fn test_api_path_for_manifest() {
		let discovery = MockDiscovery::default();
		let manifest = json!({
			"apiVersion": "v1",
			"kind": "Service",
			"metadata": {"name": "web"}
		});
		assert_eq!(
			api_path_for_manifest(&manifest, &discovery),
			Some(("/api/v1/namespaces/default/services".to_string(), "web".to_string()))
		);

		let unknown = json!({"apiVersion": "example.com/v1", "kind": "Widget", "metadata": {"name": "w"}});
		assert_eq!(api_path_for_manifest(&unknown, &discovery), None);
	}

	#[test]
	fn test_is_object_path() {
		assert!(is_object_path("/api/v1/namespaces/default"));
		assert!(is_object_path("/apis/apps/v1/namespaces/default/deployments/web"));
		assert!(!is_object_path("/api/v1"));
		assert!(!is_object_path("/apis/apps/v1"));
		assert!(!is_object_path("/apis"));
	}

	#[test]
	fn test_parse_resource_path() {
		assert_eq!(
			parse_resource_path("/apis/apps/v1/namespaces/default/deployments/web/"),
			(
				"/apis/apps/v1/namespaces/default/deployments".to_string(),
				"web".to_string()
			)
		);
	}
}
