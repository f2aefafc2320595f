//! Live object fetching with timeout and cancellation.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
	cluster::{ClusterAccess, ClusterError},
	resource::ResourceCoordinates,
};

/// Per-fetch time limit.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
	#[error("resource not found in cluster")]
	NotFound,

	#[error("unknown resource kind '{kind}'")]
	UnknownKind { kind: String },

	#[error("live fetch timed out after {after:?}")]
	Timeout { after: Duration },

	#[error("live fetch cancelled")]
	Cancelled,

	#[error(transparent)]
	Cluster(#[from] ClusterError),
}

/// Fetches live objects from a [`ClusterAccess`] under a time limit.
#[derive(Clone)]
pub struct LiveFetcher {
	cluster: Arc<dyn ClusterAccess>,
	timeout: Duration,
}

impl std::fmt::Debug for LiveFetcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LiveFetcher")
			.field("timeout", &self.timeout)
			.finish_non_exhaustive()
	}
}

impl LiveFetcher {
	pub fn new(cluster: Arc<dyn ClusterAccess>) -> Self {
		Self {
			cluster,
			timeout: DEFAULT_FETCH_TIMEOUT,
		}
	}

	#[must_use]
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	/// Fetch the live object named `name`.
	///
	/// `namespace` is only sent for namespaced resources. The request is
	/// abandoned when `cancel` fires or the time limit elapses.
	#[instrument(skip(self, coordinates, cancel), fields(resource = %coordinates))]
	pub async fn fetch(
		&self,
		coordinates: &ResourceCoordinates,
		namespace: &str,
		name: &str,
		cancel: &CancellationToken,
	) -> Result<Value, FetchError> {
		let namespace = coordinates.is_namespaced().then_some(namespace);
		let request = tokio::time::timeout(self.timeout, self.cluster.get(coordinates, namespace, name));

		tokio::select! {
			biased;
			() = cancel.cancelled() => {
				tracing::debug!("fetch cancelled");
				Err(FetchError::Cancelled)
			}
			outcome = request => match outcome {
				Err(_) => {
					tracing::warn!(timeout = ?self.timeout, "live fetch timed out");
					Err(FetchError::Timeout { after: self.timeout })
				}
				Ok(Ok(Some(live))) => Ok(live),
				Ok(Ok(None)) => Err(FetchError::NotFound),
				Ok(Err(e)) => Err(FetchError::Cluster(e)),
			}
		}
	}
}
