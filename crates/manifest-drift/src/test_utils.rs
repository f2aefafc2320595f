//! In-memory store and cluster doubles.

use std::{
	collections::{BTreeMap, HashMap},
	io,
	sync::Mutex,
	time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
	cluster::{ClusterAccess, ClusterError},
	resource::ResourceCoordinates,
	store::{ManifestFilter, ManifestRecord, ManifestStore, StoreError},
};

#[derive(Debug, Default)]
pub struct MemoryStore {
	manifests: BTreeMap<ManifestRecord, Option<String>>,
}

impl MemoryStore {
	pub fn with_manifest(mut self, namespace: &str, app: &str, kind: &str, text: &str) -> Self {
		self.manifests
			.insert(ManifestRecord::new(namespace, app, kind), Some(text.to_string()));
		self
	}

	/// Listed, but every read fails.
	pub fn with_unreadable(mut self, namespace: &str, app: &str, kind: &str) -> Self {
		self.manifests.insert(ManifestRecord::new(namespace, app, kind), None);
		self
	}
}

#[async_trait]
impl ManifestStore for MemoryStore {
	async fn list(&self, filter: &ManifestFilter) -> Result<Vec<ManifestRecord>, StoreError> {
		Ok(self
			.manifests
			.keys()
			.filter(|r| filter.matches(r))
			.cloned()
			.collect())
	}

	async fn read(&self, namespace: &str, app: &str, kind: &str) -> Result<String, StoreError> {
		let record = ManifestRecord::new(namespace, app, kind);
		match self.manifests.get(&record) {
			Some(Some(text)) => Ok(text.clone()),
			Some(None) => Err(StoreError::Read {
				path: record.relative_path(),
				source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
			}),
			None => Err(StoreError::NotFound(record.relative_path().display().to_string())),
		}
	}
}

type ObjectKey = (String, Option<String>, String);

#[derive(Debug, Default)]
pub struct MemoryCluster {
	objects: HashMap<ObjectKey, Value>,
	failures: HashMap<String, String>,
	delay: Option<Duration>,
	requests: Mutex<Vec<ObjectKey>>,
}

impl MemoryCluster {
	pub fn with_object(mut self, plural: &str, namespace: Option<&str>, name: &str, object: Value) -> Self {
		self.objects.insert(
			(plural.to_string(), namespace.map(ToString::to_string), name.to_string()),
			object,
		);
		self
	}

	/// Any request for `name` fails with `message`.
	pub fn with_failure(mut self, name: &str, message: &str) -> Self {
		self.failures.insert(name.to_string(), message.to_string());
		self
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);
		self
	}

	/// (plural, namespace, name) of every request so far.
	pub fn requests(&self) -> Vec<ObjectKey> {
		self.requests.lock().unwrap().clone()
	}
}

#[async_trait]
impl ClusterAccess for MemoryCluster {
	async fn get(
		&self,
		coordinates: &ResourceCoordinates,
		namespace: Option<&str>,
		name: &str,
	) -> Result<Option<Value>, ClusterError> {
		let key = (
			coordinates.plural.clone(),
			namespace.map(ToString::to_string),
			name.to_string(),
		);
		self.requests.lock().unwrap().push(key.clone());

		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}
		if let Some(message) = self.failures.get(name) {
			return Err(ClusterError::Request(message.clone()));
		}
		Ok(self.objects.get(&key).cloned())
	}
}
