//! Read-only access to live cluster objects.

use async_trait::async_trait;
use kube::{
	api::DynamicObject,
	core::GroupVersionKind,
	discovery::ApiResource,
	Api, Client,
};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::{client::ClusterConnection, resource::ResourceCoordinates};

#[derive(Debug, Error)]
pub enum ClusterError {
	#[error("fetching {resource}/{name} from cluster")]
	Fetch {
		resource: String,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("decoding {resource}/{name}")]
	Decode {
		resource: String,
		name: String,
		#[source]
		source: serde_json::Error,
	},

	/// Failure reported by a non-kube backend.
	#[error("cluster request failed: {0}")]
	Request(String),
}

/// Read access to the live cluster.
#[async_trait]
pub trait ClusterAccess: Send + Sync {
	/// Fetch one object. `namespace` is `None` for cluster-scoped resources.
	///
	/// Returns `Ok(None)` when the object does not exist.
	async fn get(
		&self,
		coordinates: &ResourceCoordinates,
		namespace: Option<&str>,
		name: &str,
	) -> Result<Option<Value>, ClusterError>;
}

/// [`ClusterAccess`] over the kube dynamic API.
#[derive(Clone)]
pub struct KubeCluster {
	client: Client,
}

impl std::fmt::Debug for KubeCluster {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("KubeCluster").finish_non_exhaustive()
	}
}

impl KubeCluster {
	pub fn new(client: Client) -> Self {
		Self { client }
	}

	pub fn from_connection(connection: &ClusterConnection) -> Self {
		Self::new(connection.client().clone())
	}

	fn dynamic_api(&self, coordinates: &ResourceCoordinates, namespace: Option<&str>) -> Api<DynamicObject> {
		let gvk = GroupVersionKind::gvk(&coordinates.group, &coordinates.version, &coordinates.kind);
		let ar = ApiResource::from_gvk_with_plural(&gvk, &coordinates.plural);
		match namespace {
			Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
			None => Api::all_with(self.client.clone(), &ar),
		}
	}
}

#[async_trait]
impl ClusterAccess for KubeCluster {
	#[instrument(skip(self, coordinates), fields(resource = %coordinates))]
	async fn get(
		&self,
		coordinates: &ResourceCoordinates,
		namespace: Option<&str>,
		name: &str,
	) -> Result<Option<Value>, ClusterError> {
		let api = self.dynamic_api(coordinates, namespace);
		let object = match api.get(name).await {
			Ok(object) => object,
			Err(kube::Error::Api(ref err)) if err.code == 404 && names_object(&err.message, name) => {
				tracing::debug!(name, "object not found");
				return Ok(None);
			}
			Err(e) => {
				return Err(ClusterError::Fetch {
					resource: coordinates.to_string(),
					name: name.to_string(),
					source: Box::new(e),
				})
			}
		};

		serde_json::to_value(object)
			.map(Some)
			.map_err(|source| ClusterError::Decode {
				resource: coordinates.to_string(),
				name: name.to_string(),
				source,
			})
	}
}

/// Whether a 404 message is about the named object rather than its resource
/// type, e.g. `deployments.apps "web" not found`. An unserved resource type
/// yields "the server could not find the requested resource" instead.
fn names_object(message: &str, name: &str) -> bool {
	message.contains(&format!("\"{name}\" not found"))
}
