//! Drift engine: single-manifest comparison and whole-store scans.

use std::{sync::Arc, time::Duration};

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
	canonical::Canonicalizer,
	classify::{classify, render_error, DriftResult, DriftStatus, StoredManifest},
	cluster::ClusterAccess,
	diff::Differ,
	fetch::{FetchError, LiveFetcher, DEFAULT_FETCH_TIMEOUT},
	resource::Resolver,
	store::{ManifestFilter, ManifestRecord, ManifestStore, StoreError},
};

#[derive(Debug, Error)]
pub enum ScanError {
	#[error("listing stored manifests")]
	Listing(#[source] StoreError),

	#[error("drift scan cancelled after {completed} of {total} manifests")]
	Cancelled { completed: usize, total: usize },
}

/// Progress notification emitted before each manifest is compared.
#[derive(Debug, Clone, Copy)]
pub struct ScanProgress<'a> {
	/// Zero-based position of `record` in the scan.
	pub index: usize,
	pub total: usize,
	pub record: &'a ManifestRecord,
}

/// Aggregated outcome of a scan.
///
/// The counters always sum to `total`, which equals `results.len()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResults {
	pub results: Vec<DriftResult>,
	pub total: usize,
	pub in_sync: usize,
	pub drifted: usize,
	pub missing: usize,
	pub errors: usize,
}

impl ScanResults {
	pub fn push(&mut self, result: DriftResult) {
		self.total += 1;
		match result.status {
			DriftStatus::InSync => self.in_sync += 1,
			DriftStatus::Drifted => self.drifted += 1,
			DriftStatus::Missing => self.missing += 1,
			DriftStatus::Error => self.errors += 1,
		}
		self.results.push(result);
	}

	pub fn all_in_sync(&self) -> bool {
		self.in_sync == self.total
	}

	pub fn count(&self, status: DriftStatus) -> usize {
		match status {
			DriftStatus::InSync => self.in_sync,
			DriftStatus::Drifted => self.drifted,
			DriftStatus::Missing => self.missing,
			DriftStatus::Error => self.errors,
		}
	}
}

impl FromIterator<DriftResult> for ScanResults {
	fn from_iter<I: IntoIterator<Item = DriftResult>>(iter: I) -> Self {
		let mut results = Self::default();
		for result in iter {
			results.push(result);
		}
		results
	}
}

/// Compares stored manifests against the live cluster.
#[derive(Builder)]
pub struct DriftEngine {
	cluster: Arc<dyn ClusterAccess>,
	#[builder(default)]
	resolver: Resolver,
	#[builder(default)]
	canonicalizer: Canonicalizer,
	#[builder(default)]
	differ: Differ,
	#[builder(default = DEFAULT_FETCH_TIMEOUT)]
	fetch_timeout: Duration,
}

impl std::fmt::Debug for DriftEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DriftEngine")
			.field("resolver", &self.resolver)
			.field("differ", &self.differ)
			.field("fetch_timeout", &self.fetch_timeout)
			.finish_non_exhaustive()
	}
}

impl DriftEngine {
	fn fetcher(&self) -> LiveFetcher {
		LiveFetcher::new(Arc::clone(&self.cluster)).with_timeout(self.fetch_timeout)
	}

	/// Compare one stored manifest against its live counterpart.
	///
	/// Never fails: parse, resolution and fetch problems are reported as a
	/// result with status `error`.
	#[instrument(skip_all, fields(manifest = %record))]
	pub async fn compare(
		&self,
		record: &ManifestRecord,
		stored_text: &str,
		cancel: &CancellationToken,
	) -> DriftResult {
		let stored = match StoredManifest::parse(stored_text) {
			Ok(stored) => stored,
			Err(e) => return DriftResult::failed(record, render_error(&e)),
		};
		let live = self.fetch_live(record, stored.api_version(), cancel).await;
		let result = classify(record, stored, live, &self.canonicalizer, &self.differ);
		tracing::debug!(status = %result.status, diffs = result.diffs.len(), "compared manifest");
		result
	}

	async fn fetch_live(
		&self,
		record: &ManifestRecord,
		api_version: Option<&str>,
		cancel: &CancellationToken,
	) -> Result<Value, FetchError> {
		let coordinates = self
			.resolver
			.resolve(&record.kind, api_version)
			.ok_or_else(|| FetchError::UnknownKind {
				kind: record.kind.clone(),
			})?;
		self.fetcher()
			.fetch(&coordinates, &record.namespace, &record.app, cancel)
			.await
	}

	/// Compare every stored manifest. Returns `Ok(None)` when the store is empty.
	pub async fn scan<S>(
		&self,
		store: &S,
		cancel: &CancellationToken,
	) -> Result<Option<ScanResults>, ScanError>
	where
		S: ManifestStore + ?Sized,
	{
		self.scan_with_progress(store, cancel, |_| {}).await
	}

	/// Like [`Self::scan`], calling `progress` before each manifest.
	///
	/// Manifests are compared one at a time in store order. Cancellation is
	/// checked between manifests and also aborts an in-flight fetch.
	#[instrument(skip_all)]
	pub async fn scan_with_progress<S, P>(
		&self,
		store: &S,
		cancel: &CancellationToken,
		mut progress: P,
	) -> Result<Option<ScanResults>, ScanError>
	where
		S: ManifestStore + ?Sized,
		P: FnMut(ScanProgress<'_>),
	{
		let records = store
			.list(&ManifestFilter::default())
			.await
			.map_err(ScanError::Listing)?;
		if records.is_empty() {
			tracing::info!("no stored manifests; nothing to scan");
			return Ok(None);
		}

		let total = records.len();
		let mut results = ScanResults::default();
		for (index, record) in records.iter().enumerate() {
			if cancel.is_cancelled() {
				return Err(ScanError::Cancelled {
					completed: index,
					total,
				});
			}
			progress(ScanProgress {
				index,
				total,
				record,
			});

			let result = match store.read(&record.namespace, &record.app, &record.kind).await {
				Ok(text) => self.compare(record, &text, cancel).await,
				Err(e) => DriftResult::failed(record, render_error(&e)),
			};

			// the comparison may have been cut short
			if cancel.is_cancelled() {
				return Err(ScanError::Cancelled {
					completed: index,
					total,
				});
			}
			results.push(result);
		}

		tracing::info!(
			total = results.total,
			in_sync = results.in_sync,
			drifted = results.drifted,
			missing = results.missing,
			errors = results.errors,
			"drift scan complete"
		);
		Ok(Some(results))
	}

	/// Detailed comparison of a single stored manifest.
	#[instrument(skip(self, store, cancel))]
	pub async fn detail<S>(
		&self,
		store: &S,
		namespace: &str,
		app: &str,
		kind: &str,
		cancel: &CancellationToken,
	) -> DriftResult
	where
		S: ManifestStore + ?Sized,
	{
		let record = ManifestRecord::new(namespace, app, kind);
		match store.read(namespace, app, kind).await {
			Ok(text) => self.compare(&record, &text, cancel).await,
			Err(e) => DriftResult::failed(&record, render_error(&e)),
		}
	}
}
