//! Kubernetes cluster connection management.

use std::{path::PathBuf, time::Duration};

use kube::{
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config,
};
use thiserror::Error;
use tracing::instrument;

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when connecting to a Kubernetes cluster.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("both a context and an apiServer were given; specify only one")]
	AmbiguousTarget,

	#[error(
		"no cluster that matches the apiServer `{0}` was found. Please check your $KUBECONFIG"
	)]
	ClusterNotFound(String),

	#[error("no context using cluster `{0}` was found. Please check your $KUBECONFIG")]
	ContextNotFoundForCluster(String),

	#[error("no context named `{0}` was found. Please check your $KUBECONFIG")]
	ContextNotFound(String),

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

/// Which cluster to talk to.
///
/// At most one of `context` and `api_server` may be set; with neither, the
/// kubeconfig's current context is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterTarget {
	/// Explicit kubeconfig path. Defaults to `$KUBECONFIG` / `~/.kube/config`.
	pub kubeconfig: Option<PathBuf>,
	pub context: Option<String>,
	pub api_server: Option<String>,
}

/// Represents a connection to a Kubernetes cluster.
#[derive(Clone)]
pub struct ClusterConnection {
	client: Client,
	/// Human-readable identifier for the cluster (context name or API server URL).
	cluster_identifier: String,
}

impl std::fmt::Debug for ClusterConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterConnection")
			.field("cluster_identifier", &self.cluster_identifier)
			.finish_non_exhaustive()
	}
}

impl ClusterConnection {
	/// Connect using the kubeconfig named by `target`, or the default one.
	#[instrument(skip_all)]
	pub async fn connect(target: &ClusterTarget) -> Result<Self, ConnectionError> {
		let kubeconfig = match &target.kubeconfig {
			Some(path) => Kubeconfig::read_from(path)?,
			None => Kubeconfig::read()?,
		};
		Self::from_kubeconfig(target, kubeconfig).await
	}

	/// Connect using an already loaded kubeconfig.
	///
	/// - `api_server`: searches the kubeconfig for a cluster with a matching
	///   server URL, then uses a context that references that cluster
	/// - `context`: uses that context, which must exist
	/// - neither: uses the current context
	#[instrument(skip_all)]
	pub async fn from_kubeconfig(
		target: &ClusterTarget,
		kubeconfig: Kubeconfig,
	) -> Result<Self, ConnectionError> {
		let (context, cluster_identifier) = match (&target.context, &target.api_server) {
			(Some(_), Some(_)) => return Err(ConnectionError::AmbiguousTarget),
			(Some(name), None) => {
				if !kubeconfig.contexts.iter().any(|c| &c.name == name) {
					return Err(ConnectionError::ContextNotFound(name.clone()));
				}
				tracing::debug!(context = %name, "using configured context");
				(Some(name.clone()), format!("context:{name}"))
			}
			(None, Some(api_server)) => {
				let context_name = context_for_api_server(&kubeconfig, api_server)?;
				tracing::debug!(
					context = %context_name,
					api_server = %api_server,
					"found context for apiServer"
				);
				let identifier = format!("{api_server}  (context:{context_name})");
				(Some(context_name), identifier)
			}
			(None, None) => {
				let current = kubeconfig
					.current_context
					.clone()
					.unwrap_or_else(|| "<none>".to_string());
				(None, format!("context:{current}"))
			}
		};

		let mut config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context,
				..Default::default()
			},
		)
		.await?;
		config.read_timeout = Some(DEFAULT_API_TIMEOUT);
		let client = Client::try_from(config)?;

		Ok(Self {
			client,
			cluster_identifier,
		})
	}

	/// Get a reference to the underlying kube client.
	pub fn client(&self) -> &Client {
		&self.client
	}

	/// Get the cluster identifier (context name or API server URL).
	pub fn cluster_identifier(&self) -> &str {
		&self.cluster_identifier
	}
}

/// Name of the first context whose cluster serves `api_server`.
///
/// Several clusters may share a server URL; any context referencing one of
/// them qualifies. Trailing slashes do not affect the match.
fn context_for_api_server(
	kubeconfig: &Kubeconfig,
	api_server: &str,
) -> Result<String, ConnectionError> {
	let wanted = api_server.trim_end_matches('/');
	let clusters: Vec<&str> = kubeconfig
		.clusters
		.iter()
		.filter(|named| {
			named
				.cluster
				.as_ref()
				.and_then(|cluster| cluster.server.as_deref())
				.is_some_and(|server| server.trim_end_matches('/') == wanted)
		})
		.map(|named| named.name.as_str())
		.collect();
	let Some(first) = clusters.first() else {
		return Err(ConnectionError::ClusterNotFound(api_server.to_string()));
	};

	kubeconfig
		.contexts
		.iter()
		.find_map(|named| {
			let cluster = named.context.as_ref()?.cluster.as_str();
			clusters.contains(&cluster).then(|| named.name.clone())
		})
		.ok_or_else(|| ConnectionError::ContextNotFoundForCluster((*first).to_string()))
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use kube::config::{Cluster, Context, NamedCluster, NamedContext};

	use super::*;

	fn kubeconfig(clusters: &[(&str, &str)], contexts: &[(&str, &str)]) -> Kubeconfig {
		Kubeconfig {
			clusters: clusters
				.iter()
				.map(|(name, server)| NamedCluster {
					name: (*name).to_string(),
					cluster: Some(Cluster {
						server: Some((*server).to_string()),
						..Cluster::default()
					}),
				})
				.collect(),
			contexts: contexts
				.iter()
				.map(|(name, cluster)| NamedContext {
					name: (*name).to_string(),
					context: Some(Context {
						cluster: (*cluster).to_string(),
						..Context::default()
					}),
				})
				.collect(),
			..Kubeconfig::default()
		}
	}

	#[test]
	fn test_context_for_api_server() {
		let config = kubeconfig(
			&[
				("prod-a", "https://prod:6443/"),
				("prod-b", "https://prod:6443"),
				("dev", "https://dev:6443"),
			],
			&[("dev", "dev"), ("prod-admin", "prod-b")],
		);
		assert_eq!(
			context_for_api_server(&config, "https://prod:6443").unwrap(),
			"prod-admin"
		);
		assert_eq!(
			context_for_api_server(&config, "https://dev:6443/").unwrap(),
			"dev"
		);

		let orphaned = kubeconfig(&[("staging", "https://staging:6443")], &[]);
		assert_matches!(
			context_for_api_server(&orphaned, "https://staging:6443"),
			Err(ConnectionError::ContextNotFoundForCluster(name)) if name == "staging"
		);
	}

	#[tokio::test]
	async fn test_connect_ambiguous_target_errors() {
		let target = ClusterTarget {
			context: Some("dev".to_string()),
			api_server: Some("https://dev:6443".to_string()),
			..ClusterTarget::default()
		};
		let result = ClusterConnection::from_kubeconfig(&target, Kubeconfig::default()).await;
		assert_matches!(result, Err(ConnectionError::AmbiguousTarget));
	}

	#[tokio::test]
	async fn test_connect_context_not_found() {
		let target = ClusterTarget {
			context: Some("nonexistent".to_string()),
			..ClusterTarget::default()
		};
		let result = ClusterConnection::from_kubeconfig(&target, Kubeconfig::default()).await;
		assert_matches!(
			result,
			Err(ConnectionError::ContextNotFound(name)) if name == "nonexistent"
		);
	}

	#[tokio::test]
	async fn test_connect_api_server_not_found() {
		let target = ClusterTarget {
			api_server: Some("https://unknown:6443".to_string()),
			..ClusterTarget::default()
		};
		let result = ClusterConnection::from_kubeconfig(&target, Kubeconfig::default()).await;
		assert_matches!(
			result,
			Err(ConnectionError::ClusterNotFound(server)) if server == "https://unknown:6443"
		);
	}
}
