//! Stored manifests, keyed by (namespace, app, kind).

use std::{
	fmt, io,
	path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

pub const MANIFEST_EXTENSION: &str = "yaml";

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("manifest not found: {0}")]
	NotFound(String),

	#[error("reading manifest {}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("walking manifest directory {}", root.display())]
	Walk {
		root: PathBuf,
		#[source]
		source: walkdir::Error,
	},

	#[error("manifest listing task failed")]
	Task(#[source] tokio::task::JoinError),
}

/// Identity of one stored manifest. `app` doubles as the live resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestRecord {
	pub namespace: String,
	pub app: String,
	pub kind: String,
}

impl ManifestRecord {
	pub fn new(namespace: impl Into<String>, app: impl Into<String>, kind: impl Into<String>) -> Self {
		Self {
			namespace: namespace.into(),
			app: app.into(),
			kind: kind.into(),
		}
	}

	/// `<namespace>/<app>/<kind>.yaml`
	pub fn relative_path(&self) -> PathBuf {
		Path::new(&self.namespace)
			.join(&self.app)
			.join(format!("{}.{MANIFEST_EXTENSION}", self.kind))
	}
}

impl fmt::Display for ManifestRecord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}/{}", self.namespace, self.app, self.kind)
	}
}

/// Optional namespace/app restriction for [`ManifestStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestFilter {
	pub namespace: Option<String>,
	pub app: Option<String>,
}

impl ManifestFilter {
	#[must_use]
	pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
		self.namespace = Some(namespace.into());
		self
	}

	#[must_use]
	pub fn app(mut self, app: impl Into<String>) -> Self {
		self.app = Some(app.into());
		self
	}

	pub fn matches(&self, record: &ManifestRecord) -> bool {
		self.namespace.as_ref().is_none_or(|ns| *ns == record.namespace)
			&& self.app.as_ref().is_none_or(|app| *app == record.app)
	}
}

/// Read-only access to stored manifests.
#[async_trait]
pub trait ManifestStore: Send + Sync {
	/// Records in a stable order.
	async fn list(&self, filter: &ManifestFilter) -> Result<Vec<ManifestRecord>, StoreError>;

	/// Raw text of one stored manifest.
	async fn read(&self, namespace: &str, app: &str, kind: &str) -> Result<String, StoreError>;
}

/// Manifests laid out on disk as `<root>/<namespace>/<app>/<kind>.yaml`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
	root: PathBuf,
}

impl DirectoryStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn record_for(&self, path: &Path) -> Option<ManifestRecord> {
		let relative = path.strip_prefix(&self.root).ok()?;
		let parts: Vec<&str> = relative
			.iter()
			.map(|c| c.to_str())
			.collect::<Option<_>>()?;
		let [namespace, app, file] = parts.as_slice() else {
			return None;
		};
		let kind = file.strip_suffix(&format!(".{MANIFEST_EXTENSION}"))?;
		if kind.is_empty() {
			return None;
		}
		Some(ManifestRecord::new(*namespace, *app, kind))
	}

	fn list_blocking(&self, filter: &ManifestFilter) -> Result<Vec<ManifestRecord>, StoreError> {
		if !self.root.is_dir() {
			tracing::debug!(root = %self.root.display(), "manifest directory does not exist");
			return Ok(Vec::new());
		}

		let mut records = Vec::new();
		let walker = WalkDir::new(&self.root)
			.min_depth(1)
			.max_depth(3)
			.sort_by_file_name()
			.into_iter()
			.filter_entry(|e| e.file_name() != ".git");
		for entry in walker {
			let entry = entry.map_err(|source| StoreError::Walk {
				root: self.root.clone(),
				source,
			})?;
			if !entry.file_type().is_file() {
				continue;
			}
			if let Some(record) = self.record_for(entry.path()) {
				if filter.matches(&record) {
					records.push(record);
				}
			}
		}
		Ok(records)
	}
}

#[async_trait]
impl ManifestStore for DirectoryStore {
	async fn list(&self, filter: &ManifestFilter) -> Result<Vec<ManifestRecord>, StoreError> {
		// walkdir is blocking
		let store = self.clone();
		let filter = filter.clone();
		tokio::task::spawn_blocking(move || store.list_blocking(&filter))
			.await
			.map_err(StoreError::Task)?
	}

	async fn read(&self, namespace: &str, app: &str, kind: &str) -> Result<String, StoreError> {
		let record = ManifestRecord::new(namespace, app, kind);
		let relative = record.relative_path();
		let path = self.root.join(&relative);
		tokio::fs::read_to_string(&path).await.map_err(|source| {
			if source.kind() == io::ErrorKind::NotFound {
				StoreError::NotFound(relative.display().to_string())
			} else {
				StoreError::Read { path, source }
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use std::fs;

	use assert_matches::assert_matches;
	use tempfile::TempDir;

	use super::*;

	fn write(root: &Path, relative: &str, contents: &str) {
		let path = root.join(relative);
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(path, contents).unwrap();
	}

	fn fixture() -> TempDir {
		let temp = TempDir::new().unwrap();
		let root = temp.path();
		write(root, "default/web/service.yaml", "kind: Service\n");
		write(root, "default/web/deployment.yaml", "kind: Deployment\n");
		write(root, "monitoring/grafana/configmap.yaml", "kind: ConfigMap\n");
		write(root, "default/web/notes.txt", "ignored");
		write(root, "default/stray.yaml", "ignored");
		write(root, "default/web/nested/deep.yaml", "ignored");
		write(root, ".git/objects/ab/cd.yaml", "ignored");
		temp
	}

	#[tokio::test]
	async fn test_list_sorted_and_filtered_by_layout() {
		let temp = fixture();
		let store = DirectoryStore::new(temp.path());
		let records = store.list(&ManifestFilter::default()).await.unwrap();
		assert_eq!(
			records,
			vec![
				ManifestRecord::new("default", "web", "deployment"),
				ManifestRecord::new("default", "web", "service"),
				ManifestRecord::new("monitoring", "grafana", "configmap"),
			]
		);
	}

	#[tokio::test]
	async fn test_list_with_filter() {
		let temp = fixture();
		let store = DirectoryStore::new(temp.path());
		let records = store
			.list(&ManifestFilter::default().namespace("monitoring"))
			.await
			.unwrap();
		assert_eq!(records, vec![ManifestRecord::new("monitoring", "grafana", "configmap")]);

		let records = store
			.list(&ManifestFilter::default().namespace("default").app("api"))
			.await
			.unwrap();
		assert!(records.is_empty());
	}

	#[tokio::test]
	async fn test_list_missing_root_is_empty() {
		let temp = TempDir::new().unwrap();
		let store = DirectoryStore::new(temp.path().join("absent"));
		assert_eq!(store.root(), temp.path().join("absent"));
		assert!(store.list(&ManifestFilter::default()).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_read() {
		let temp = fixture();
		let store = DirectoryStore::new(temp.path());
		assert_eq!(store.read("default", "web", "service").await.unwrap(), "kind: Service\n");
	}

	#[tokio::test]
	async fn test_read_missing_names_path() {
		let temp = fixture();
		let store = DirectoryStore::new(temp.path());
		let err = store.read("default", "web", "ingress").await.unwrap_err();
		assert_matches!(&err, StoreError::NotFound(path) if path == "default/web/ingress.yaml");
		assert_eq!(err.to_string(), "manifest not found: default/web/ingress.yaml");
	}

	#[test]
	fn test_record_display() {
		let record = ManifestRecord::new("default", "web", "service");
		assert_eq!(record.to_string(), "default/web/service");
		assert_eq!(record.relative_path(), PathBuf::from("default/web/service.yaml"));
	}
}
