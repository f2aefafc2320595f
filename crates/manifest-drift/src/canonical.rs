//! Removal of server-assigned fields before comparison.
//!
//! Both the stored and the live document pass through the same
//! [`Canonicalizer`], so fields the API server fills in on its own never show
//! up as drift.

use serde_json::Value;

/// Metadata fields assigned by the API server.
const SERVER_METADATA_FIELDS: &[&str] = &[
	"uid",
	"resourceVersion",
	"generation",
	"creationTimestamp",
	"managedFields",
	"selfLink",
];

/// Spec fields allocated by the cluster (service IPs).
const SERVER_SPEC_FIELDS: &[&str] = &["clusterIP", "clusterIPs"];

/// Annotation prefixes written by client tooling and controllers.
const DEFAULT_ANNOTATION_PREFIXES: &[&str] =
	&["kubectl.kubernetes.io/", "deployment.kubernetes.io/"];

const DEFAULT_ANNOTATION_KEYS: &[&str] = &["kubernetes.io/change-cause"];

#[derive(Debug, Clone)]
pub struct Canonicalizer {
	annotation_prefixes: Vec<String>,
	annotation_keys: Vec<String>,
}

impl Default for Canonicalizer {
	fn default() -> Self {
		Self {
			annotation_prefixes: DEFAULT_ANNOTATION_PREFIXES
				.iter()
				.map(ToString::to_string)
				.collect(),
			annotation_keys: DEFAULT_ANNOTATION_KEYS
				.iter()
				.map(ToString::to_string)
				.collect(),
		}
	}
}

impl Canonicalizer {
	/// Also drop annotations starting with `prefix`.
	#[must_use]
	pub fn with_annotation_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.annotation_prefixes.push(prefix.into());
		self
	}

	/// Strip server-assigned fields in place.
	///
	/// Removes server metadata, tooling annotations (and the annotation map
	/// itself once empty), the whole `status` section and cluster-allocated
	/// service IPs. Idempotent; non-object documents are left untouched.
	pub fn canonicalize(&self, document: &mut Value) {
		let Some(root) = document.as_object_mut() else {
			return;
		};

		if let Some(Value::Object(metadata)) = root.get_mut("metadata") {
			for field in SERVER_METADATA_FIELDS {
				metadata.remove(*field);
			}

			if let Some(Value::Object(annotations)) = metadata.get_mut("annotations") {
				annotations.retain(|key, _| !self.ignores_annotation(key));
				if annotations.is_empty() {
					metadata.remove("annotations");
				}
			}
		}

		root.remove("status");

		if let Some(Value::Object(spec)) = root.get_mut("spec") {
			for field in SERVER_SPEC_FIELDS {
				spec.remove(*field);
			}
		}
	}

	fn ignores_annotation(&self, key: &str) -> bool {
		self.annotation_keys.iter().any(|k| k == key)
			|| self
				.annotation_prefixes
				.iter()
				.any(|prefix| key.starts_with(prefix.as_str()))
	}
}
