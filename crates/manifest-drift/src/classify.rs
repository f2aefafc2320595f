//! Per-manifest drift classification.

use std::{error::Error as StdError, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
	canonical::Canonicalizer,
	diff::{DiffEntry, Differ},
	fetch::FetchError,
	store::ManifestRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftStatus {
	InSync,
	Drifted,
	Missing,
	Error,
}

impl fmt::Display for DriftStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::InSync => "in_sync",
			Self::Drifted => "drifted",
			Self::Missing => "missing",
			Self::Error => "error",
		};
		write!(f, "{s}")
	}
}

/// Outcome of comparing one stored manifest against the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftResult {
	pub namespace: String,
	pub name: String,
	pub kind: String,
	pub status: DriftStatus,
	/// Drift entries in path order. Empty unless `status` is `drifted`.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub diffs: Vec<DiffEntry>,
	/// Set only when `status` is `error`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl DriftResult {
	fn new(record: &ManifestRecord, status: DriftStatus) -> Self {
		Self {
			namespace: record.namespace.clone(),
			name: record.app.clone(),
			kind: record.kind.clone(),
			status,
			diffs: Vec::new(),
			error: None,
		}
	}

	pub fn failed(record: &ManifestRecord, message: impl Into<String>) -> Self {
		Self {
			error: Some(message.into()),
			..Self::new(record, DriftStatus::Error)
		}
	}

	/// `namespace/name/kind`
	pub fn resource(&self) -> String {
		format!("{}/{}/{}", self.namespace, self.name, self.kind)
	}
}

#[derive(Debug, Error)]
pub enum ParseError {
	#[error("failed to parse stored manifest")]
	Yaml(#[source] serde_yaml_with_quirks::Error),

	#[error("failed to parse stored manifest: document is not a mapping")]
	NotAMapping,
}

/// A parsed stored manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredManifest {
	document: Value,
}

impl StoredManifest {
	pub fn parse(text: &str) -> Result<Self, ParseError> {
		let document: Value = serde_yaml_with_quirks::from_str(text).map_err(ParseError::Yaml)?;
		if !document.is_object() {
			return Err(ParseError::NotAMapping);
		}
		Ok(Self { document })
	}

	/// Top-level `apiVersion`, if present and non-empty.
	pub fn api_version(&self) -> Option<&str> {
		self.document
			.get("apiVersion")
			.and_then(Value::as_str)
			.filter(|v| !v.is_empty())
	}

	pub fn into_document(self) -> Value {
		self.document
	}
}

/// Render an error and its source chain as `outer: inner: ...`.
pub fn render_error(err: &(dyn StdError + 'static)) -> String {
	let mut message = err.to_string();
	let mut source = err.source();
	while let Some(cause) = source {
		let cause_message = cause.to_string();
		// transparent wrappers repeat their inner message
		if !message.ends_with(&cause_message) {
			message.push_str(": ");
			message.push_str(&cause_message);
		}
		source = cause.source();
	}
	message
}

/// Classify one manifest given its parsed stored form and the live fetch outcome.
///
/// Both documents are canonicalized before diffing; live-only fields are
/// dropped since they are server-populated defaults.
pub fn classify(
	record: &ManifestRecord,
	stored: StoredManifest,
	live: Result<Value, FetchError>,
	canonicalizer: &Canonicalizer,
	differ: &Differ,
) -> DriftResult {
	let mut live = match live {
		Ok(live) => live,
		Err(FetchError::NotFound) => return DriftResult::new(record, DriftStatus::Missing),
		Err(err) => return DriftResult::failed(record, render_error(&err)),
	};
	let mut stored = stored.into_document();

	canonicalizer.canonicalize(&mut stored);
	canonicalizer.canonicalize(&mut live);

	let diffs: Vec<DiffEntry> = differ
		.diff_documents(&stored, &live)
		.into_iter()
		.filter(DiffEntry::is_drift)
		.collect();

	if diffs.is_empty() {
		DriftResult::new(record, DriftStatus::InSync)
	} else {
		DriftResult {
			diffs,
			..DriftResult::new(record, DriftStatus::Drifted)
		}
	}
}
