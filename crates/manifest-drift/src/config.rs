//! Configuration file support.
//!
//! Supports `.driftctl.yaml` files that can be placed anywhere in the
//! directory hierarchy; the nearest one found searching upward from the
//! working directory wins.

use std::{
	collections::BTreeMap,
	env, fs,
	path::{Path, PathBuf},
	time::Duration,
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::{
	canonical::Canonicalizer,
	client::ClusterTarget,
	diff::{Differ, DEFAULT_MAX_DEPTH},
	fetch::DEFAULT_FETCH_TIMEOUT,
	resource::{pluralize, KnownKind, ResourceScope, ResourceTable},
};

/// The name of the config file driftctl looks for
pub const CONFIG_FILE_NAME: &str = ".driftctl.yaml";

/// Root configuration structure for .driftctl.yaml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftConfig {
	#[serde(default)]
	pub kubernetes: KubernetesConfig,

	#[serde(default)]
	pub manifests: ManifestsConfig,

	#[serde(default)]
	pub drift: DriftSettings,

	#[serde(default)]
	pub resources: ResourcesConfig,
}

/// Which cluster to compare against.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
	/// Path to the kubeconfig; `~` is expanded.
	pub kubeconfig: Option<PathBuf>,
	pub context: Option<String>,
	/// Select the context whose cluster serves this URL.
	pub api_server: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestsConfig {
	/// Root of the `<namespace>/<app>/<kind>.yaml` tree; `~` is expanded.
	pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftSettings {
	pub fetch_timeout_seconds: Option<u64>,
	pub max_depth: Option<usize>,
	/// Extra annotation prefixes to ignore on both sides.
	#[serde(default)]
	pub ignore_annotation_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesConfig {
	/// alias -> kind
	#[serde(default)]
	pub aliases: BTreeMap<String, String>,
	#[serde(default)]
	pub kinds: Vec<CustomKind>,
	/// Query the cluster's discovery API. Defaults to true.
	pub discovery: Option<bool>,
}

/// A kind added to (or overriding) the built-in resource table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomKind {
	pub kind: String,
	#[serde(default)]
	pub group: String,
	pub version: String,
	/// Defaults to the pluralized kind.
	pub plural: Option<String>,
	#[serde(default = "default_namespaced")]
	pub namespaced: bool,
}

fn default_namespaced() -> bool {
	true
}

impl DriftConfig {
	/// Load config by searching from the given directory upward
	pub fn load_from_directory(start_dir: &Path) -> Result<Option<Self>> {
		if let Some(config_path) = find_config_file(start_dir) {
			let config = Self::load_from_file(&config_path)?;
			Ok(Some(config))
		} else {
			Ok(None)
		}
	}

	/// Load config from a specific file path
	pub fn load_from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.with_context(|| format!("failed to read config file: {}", path.display()))?;
		let config: DriftConfig = serde_yaml_with_quirks::from_str(&content)
			.with_context(|| format!("failed to parse config file: {}", path.display()))?;
		config
			.validate()
			.with_context(|| format!("invalid config file: {}", path.display()))?;
		tracing::debug!(path = %path.display(), "loaded config file");
		Ok(config)
	}

	fn validate(&self) -> Result<()> {
		if self.drift.max_depth == Some(0) {
			bail!("drift.maxDepth must be at least 1");
		}
		if self.drift.fetch_timeout_seconds == Some(0) {
			bail!("drift.fetchTimeoutSeconds must be at least 1");
		}
		Ok(())
	}

	pub fn manifest_directory(&self) -> Option<PathBuf> {
		self.manifests.directory.as_deref().map(expand_home)
	}

	pub fn cluster_target(&self) -> ClusterTarget {
		ClusterTarget {
			kubeconfig: self.kubernetes.kubeconfig.as_deref().map(expand_home),
			context: self.kubernetes.context.clone(),
			api_server: self.kubernetes.api_server.clone(),
		}
	}

	pub fn fetch_timeout(&self) -> Duration {
		self.drift
			.fetch_timeout_seconds
			.map_or(DEFAULT_FETCH_TIMEOUT, Duration::from_secs)
	}

	pub fn differ(&self) -> Differ {
		Differ::new(self.drift.max_depth.unwrap_or(DEFAULT_MAX_DEPTH))
	}

	pub fn canonicalizer(&self) -> Canonicalizer {
		self.drift
			.ignore_annotation_prefixes
			.iter()
			.fold(Canonicalizer::default(), |c, prefix| {
				c.with_annotation_prefix(prefix.clone())
			})
	}

	/// Built-in table extended with the configured kinds and aliases.
	pub fn resource_table(&self) -> ResourceTable {
		let mut table = ResourceTable::builtin();
		for custom in &self.resources.kinds {
			let plural = custom
				.plural
				.clone()
				.unwrap_or_else(|| pluralize(&custom.kind));
			let scope = if custom.namespaced {
				ResourceScope::Namespaced
			} else {
				ResourceScope::ClusterWide
			};
			table = table.with_kind(
				&custom.kind,
				KnownKind::new(custom.group.clone(), custom.version.clone(), plural),
				scope,
			);
		}
		for (alias, kind) in &self.resources.aliases {
			table = table.with_alias(alias, kind);
		}
		table
	}

	pub fn discovery_enabled(&self) -> bool {
		self.resources.discovery.unwrap_or(true)
	}
}

/// Expand a leading `~` to `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
	let Ok(rest) = path.strip_prefix("~") else {
		return path.to_path_buf();
	};
	match env::var_os("HOME") {
		Some(home) => PathBuf::from(home).join(rest),
		None => path.to_path_buf(),
	}
}

/// Search for a config file starting from `start_dir` and walking up to the filesystem root
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
	let mut current = start_dir.to_path_buf();

	// Canonicalize if possible to handle relative paths
	if let Ok(canonical) = current.canonicalize() {
		current = canonical;
	}

	loop {
		let config_path = current.join(CONFIG_FILE_NAME);
		if config_path.exists() {
			return Some(config_path);
		}

		match current.parent() {
			Some(parent) if parent != current => current = parent.to_path_buf(),
			_ => break,
		}
	}

	None
}
