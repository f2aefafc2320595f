//! Structural diff of two JSON-shaped documents.
//!
//! Paths use dotted keys for mappings and `[i]` for sequence positions, e.g.
//! `spec.template.spec.containers[0].image`. Mapping keys are visited in
//! lexical order so the output is deterministic.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Default nesting limit for [`Differ`].
///
/// Past the limit, subtrees are only checked for drift, without
/// reporting individual paths.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Note attached to the entry emitted when the nesting limit is hit.
pub const DEPTH_EXCEEDED_NOTE: &str = "maximum comparison depth exceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
	/// Present on both sides with different values.
	Changed,
	/// Present only in the live document.
	Added,
	/// Present only in the stored document.
	Removed,
}

impl fmt::Display for ChangeType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Changed => "changed",
			Self::Added => "added",
			Self::Removed => "removed",
		};
		write!(f, "{s}")
	}
}

/// One difference between the stored and the live document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
	pub path: String,
	pub change_type: ChangeType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stored: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub live: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
}

impl DiffEntry {
	pub fn changed(path: impl Into<String>, stored: Value, live: Value) -> Self {
		Self {
			path: path.into(),
			change_type: ChangeType::Changed,
			stored: Some(stored),
			live: Some(live),
			note: None,
		}
	}

	pub fn added(path: impl Into<String>, live: Value) -> Self {
		Self {
			path: path.into(),
			change_type: ChangeType::Added,
			stored: None,
			live: Some(live),
			note: None,
		}
	}

	pub fn removed(path: impl Into<String>, stored: Value) -> Self {
		Self {
			path: path.into(),
			change_type: ChangeType::Removed,
			stored: Some(stored),
			live: None,
			note: None,
		}
	}

	fn depth_exceeded(path: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			change_type: ChangeType::Changed,
			stored: None,
			live: None,
			note: Some(DEPTH_EXCEEDED_NOTE.to_string()),
		}
	}

	/// Whether this entry counts as drift. Live-only fields are defaults
	/// filled in by the server and do not.
	pub fn is_drift(&self) -> bool {
		self.change_type != ChangeType::Added
	}
}

/// Recursive comparator with a nesting limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Differ {
	max_depth: usize,
}

impl Default for Differ {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_DEPTH)
	}
}

impl Differ {
	pub fn new(max_depth: usize) -> Self {
		Self { max_depth }
	}

	pub fn max_depth(&self) -> usize {
		self.max_depth
	}

	/// Compare two mappings. Every emitted path starts with `prefix`
	/// (joined with `.` when non-empty).
	pub fn diff(
		&self,
		stored: &Map<String, Value>,
		live: &Map<String, Value>,
		prefix: &str,
	) -> Vec<DiffEntry> {
		let mut out = Vec::new();
		self.diff_maps(stored, live, prefix, 0, &mut out);
		out
	}

	/// Compare two whole documents of any shape.
	pub fn diff_documents(&self, stored: &Value, live: &Value) -> Vec<DiffEntry> {
		let mut out = Vec::new();
		self.diff_values(stored, live, "", 0, &mut out);
		out
	}

	fn diff_maps(
		&self,
		stored: &Map<String, Value>,
		live: &Map<String, Value>,
		prefix: &str,
		depth: usize,
		out: &mut Vec<DiffEntry>,
	) {
		let keys: BTreeSet<&String> = stored.keys().chain(live.keys()).collect();
		for key in keys {
			let path = if prefix.is_empty() {
				key.clone()
			} else {
				format!("{prefix}.{key}")
			};
			match (stored.get(key.as_str()), live.get(key.as_str())) {
				(Some(s), Some(l)) => self.diff_values(s, l, &path, depth, out),
				(Some(s), None) => out.push(DiffEntry::removed(path, s.clone())),
				(None, Some(l)) => out.push(DiffEntry::added(path, l.clone())),
				(None, None) => {}
			}
		}
	}

	fn diff_sequences(
		&self,
		stored: &[Value],
		live: &[Value],
		path: &str,
		depth: usize,
		out: &mut Vec<DiffEntry>,
	) {
		for i in 0..stored.len().max(live.len()) {
			let item_path = format!("{path}[{i}]");
			match (stored.get(i), live.get(i)) {
				(Some(s), Some(l)) => self.diff_values(s, l, &item_path, depth, out),
				(Some(s), None) => out.push(DiffEntry::removed(item_path, s.clone())),
				(None, Some(l)) => out.push(DiffEntry::added(item_path, l.clone())),
				(None, None) => {}
			}
		}
	}

	fn diff_values(
		&self,
		stored: &Value,
		live: &Value,
		path: &str,
		depth: usize,
		out: &mut Vec<DiffEntry>,
	) {
		match (stored, live) {
			(Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_))
				if depth >= self.max_depth =>
			{
				if subtree_drifts(stored, live) {
					out.push(DiffEntry::depth_exceeded(path));
				}
			}
			(Value::Object(s), Value::Object(l)) => self.diff_maps(s, l, path, depth + 1, out),
			(Value::Array(s), Value::Array(l)) => self.diff_sequences(s, l, path, depth + 1, out),
			(Value::Number(s), Value::Number(l)) => {
				if !numbers_equal(s, l) {
					out.push(DiffEntry::changed(path, stored.clone(), live.clone()));
				}
			}
			_ => {
				if stored != live {
					out.push(DiffEntry::changed(path, stored.clone(), live.clone()));
				}
			}
		}
	}
}

/// Whether a full diff of `stored` against `live` would contain any drift
/// entry. Walks with an explicit stack so arbitrarily deep input is safe.
fn subtree_drifts(stored: &Value, live: &Value) -> bool {
	let mut pending = vec![(stored, live)];
	while let Some((stored, live)) = pending.pop() {
		match (stored, live) {
			(Value::Object(s), Value::Object(l)) => {
				for (key, s) in s {
					// live-only keys are not drift
					match l.get(key) {
						Some(l) => pending.push((s, l)),
						None => return true,
					}
				}
			}
			(Value::Array(s), Value::Array(l)) => {
				if s.len() > l.len() {
					return true;
				}
				pending.extend(s.iter().zip(l));
			}
			(Value::Number(s), Value::Number(l)) => {
				if !numbers_equal(s, l) {
					return true;
				}
			}
			_ => {
				if stored != live {
					return true;
				}
			}
		}
	}
	false
}

/// Numeric equality across integer and floating-point representations,
/// so `80` and `80.0` compare equal.
fn numbers_equal(a: &Number, b: &Number) -> bool {
	match (exact_integer(a), exact_integer(b)) {
		(Some(x), Some(y)) => x == y,
		_ => match (a.as_f64(), b.as_f64()) {
			(Some(x), Some(y)) => x == y,
			_ => a == b,
		},
	}
}

fn exact_integer(n: &Number) -> Option<i128> {
	if let Some(i) = n.as_i64() {
		return Some(i128::from(i));
	}
	if let Some(u) = n.as_u64() {
		return Some(i128::from(u));
	}
	let f = n.as_f64()?;
	(f.fract() == 0.0 && f.abs() < 1e38).then(|| f as i128)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn diff(stored: Value, live: Value) -> Vec<DiffEntry> {
		Differ::default().diff_documents(&stored, &live)
	}

	#[test]
	fn test_identical_maps() {
		let doc = json!({"a": 1, "b": {"c": [1, 2, {"d": "e"}]}});
		assert!(diff(doc.clone(), doc).is_empty());
	}

	#[test]
	fn test_changed_scalar() {
		assert_eq!(
			diff(json!({"replicas": 3}), json!({"replicas": 5})),
			vec![DiffEntry::changed("replicas", json!(3), json!(5))]
		);
	}

	#[test]
	fn test_added_and_removed_keys() {
		assert_eq!(
			diff(json!({"a": 1}), json!({"b": 2})),
			vec![
				DiffEntry::removed("a", json!(1)),
				DiffEntry::added("b", json!(2)),
			]
		);
	}

	#[test]
	fn test_nested_path() {
		let stored = json!({"spec": {"template": {"spec": {"containers": [{"image": "nginx:1.25"}]}}}});
		let live = json!({"spec": {"template": {"spec": {"containers": [{"image": "nginx:1.26"}]}}}});
		assert_eq!(
			diff(stored, live),
			vec![DiffEntry::changed(
				"spec.template.spec.containers[0].image",
				json!("nginx:1.25"),
				json!("nginx:1.26"),
			)]
		);
	}

	#[test]
	fn test_sequence_length_mismatch() {
		assert_eq!(
			diff(json!({"s": ["a", "b"]}), json!({"s": ["a", "b", "c"]})),
			vec![DiffEntry::added("s[2]", json!("c"))]
		);
		assert_eq!(
			diff(json!({"s": ["a", "b", "c"]}), json!({"s": ["a"]})),
			vec![
				DiffEntry::removed("s[1]", json!("b")),
				DiffEntry::removed("s[2]", json!("c")),
			]
		);
	}

	#[test]
	fn test_prefix_is_joined() {
		let stored = json!({"image": "a"});
		let live = json!({"image": "b"});
		let entries = Differ::default().diff(
			stored.as_object().unwrap(),
			live.as_object().unwrap(),
			"spec",
		);
		assert_eq!(entries[0].path, "spec.image");
	}

	#[test]
	fn test_entries_follow_lexical_key_order() {
		let paths: Vec<_> = diff(
			json!({"d": 1, "b": 1, "c": 1, "a": 1}),
			json!({"d": 2, "b": 2, "c": 2, "a": 1}),
		)
		.into_iter()
		.map(|e| e.path)
		.collect();
		assert_eq!(paths, vec!["b", "c", "d"]);
	}

	#[test]
	fn test_int_and_float_compare_equal() {
		assert!(diff(json!({"port": 80}), json!({"port": 80.0})).is_empty());
		assert!(diff(json!({"n": -3}), json!({"n": -3.0})).is_empty());
		assert!(diff(json!({"n": u64::MAX}), json!({"n": u64::MAX})).is_empty());
	}

	#[test]
	fn test_numeric_difference_detected() {
		assert_eq!(
			diff(json!({"ratio": 0.5}), json!({"ratio": 0.75})),
			vec![DiffEntry::changed("ratio", json!(0.5), json!(0.75))]
		);
		assert_eq!(diff(json!({"n": 80}), json!({"n": 80.5})).len(), 1);
	}

	#[test]
	fn test_type_mismatch_is_changed() {
		assert_eq!(
			diff(json!({"v": "80"}), json!({"v": 80})),
			vec![DiffEntry::changed("v", json!("80"), json!(80))]
		);
		assert_eq!(
			diff(json!({"v": {"a": 1}}), json!({"v": [1]})),
			vec![DiffEntry::changed("v", json!({"a": 1}), json!([1]))]
		);
		assert_eq!(
			diff(json!({"v": null}), json!({"v": false})),
			vec![DiffEntry::changed("v", json!(null), json!(false))]
		);
	}

	#[test]
	fn test_depth_limit_emits_single_entry() {
		let stored = json!({"a": {"b": {"c": {"d": 1}}}});
		let live = json!({"a": {"b": {"c": {"d": 2, "e": 3}}}});
		let entries = Differ::new(2).diff_documents(&stored, &live);
		assert_eq!(
			entries,
			vec![DiffEntry {
				path: "a.b".to_string(),
				change_type: ChangeType::Changed,
				stored: None,
				live: None,
				note: Some(DEPTH_EXCEEDED_NOTE.to_string()),
			}]
		);
	}

	#[test]
	fn test_deep_nesting_terminates() {
		let mut stored = json!(1);
		let mut live = json!(2);
		for _ in 0..500 {
			stored = json!({"x": stored});
			live = json!({"x": live});
		}
		let entries = diff(stored, live);
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].note.as_deref(), Some(DEPTH_EXCEEDED_NOTE));
	}

	#[test]
	fn test_identical_subtrees_past_depth_limit_are_equal() {
		let mut doc = json!({"port": 80});
		for _ in 0..70 {
			doc = json!({"x": doc});
		}
		assert!(diff(doc.clone(), doc).is_empty());

		let differ = Differ::new(1);
		let stored = json!({"a": {"b": [1, {"port": 80}]}});
		let live = json!({"a": {"b": [1, {"port": 80.0, "protocol": "TCP"}, 3]}});
		assert!(differ.diff_documents(&stored, &live).is_empty());
	}

	#[test]
	fn test_removal_past_depth_limit_is_reported() {
		let differ = Differ::new(1);
		let stored = json!({"a": {"b": [1, 2]}});
		let live = json!({"a": {"b": [1]}});
		let entries = differ.diff_documents(&stored, &live);
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].path, "a");
		assert_eq!(entries[0].note.as_deref(), Some(DEPTH_EXCEEDED_NOTE));
	}

	#[test]
	fn test_serialization_omits_absent_fields() {
		let entry = DiffEntry::added("spec.x", json!(1));
		assert_eq!(
			serde_json::to_value(&entry).unwrap(),
			json!({"path": "spec.x", "change_type": "added", "live": 1})
		);
	}
}
