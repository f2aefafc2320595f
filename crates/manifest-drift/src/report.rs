//! Human-readable rendering of drift results.

use std::io::{self, Write};

use nu_ansi_term::{Color, Style};
use serde_json::Value;
use tabwriter::TabWriter;

use crate::{
	classify::{DriftResult, DriftStatus},
	diff::{ChangeType, DiffEntry},
	scan::ScanResults,
};

fn status_label(result: &DriftResult) -> String {
	match result.status {
		DriftStatus::InSync => "OK".to_string(),
		DriftStatus::Drifted => format!("DRIFTED ({} fields)", result.diffs.len()),
		DriftStatus::Missing => "NOT IN CLUSTER".to_string(),
		DriftStatus::Error => format!(
			"ERROR: {}",
			table_cell(result.error.as_deref().unwrap_or("unknown"))
		),
	}
}

/// Keep a value inside one tabwriter cell.
fn table_cell(text: &str) -> String {
	text.replace(['\t', '\n', '\r'], " ")
}

fn status_style(status: DriftStatus) -> Style {
	match status {
		DriftStatus::InSync => Style::new().fg(Color::Green),
		DriftStatus::Drifted => Style::new().fg(Color::Yellow).bold(),
		DriftStatus::Missing => Style::new().fg(Color::Red),
		DriftStatus::Error => Style::new().fg(Color::Red).bold(),
	}
}

/// Compact single-line JSON rendering of a value.
fn render_value(value: Option<&Value>) -> String {
	value.map_or_else(|| "<none>".to_string(), Value::to_string)
}

impl DriftResult {
	/// One-line summary of this result.
	pub fn summary(&self) -> String {
		let resource = self.resource();
		match self.status {
			DriftStatus::InSync => format!("{resource} is in sync with the cluster"),
			DriftStatus::Drifted => format!(
				"{resource} has {} field(s) that differ from the cluster",
				self.diffs.len()
			),
			DriftStatus::Missing => format!("{resource} does not exist in the cluster"),
			DriftStatus::Error => format!(
				"Error comparing {resource}: {}",
				self.error.as_deref().unwrap_or("unknown")
			),
		}
	}

	/// Summary line followed by one line per drift entry:
	///
	/// ```text
	///   ~ spec.replicas: 3 -> 5
	///   - metadata.labels.tier: "web"
	/// ```
	pub fn write_details<W: Write>(&self, mut writer: W) -> io::Result<()> {
		writeln!(writer, "{}", self.summary())?;
		for entry in &self.diffs {
			write_entry(&mut writer, entry)?;
		}
		Ok(())
	}
}

fn write_entry<W: Write>(writer: &mut W, entry: &DiffEntry) -> io::Result<()> {
	if let Some(note) = &entry.note {
		return writeln!(writer, "  ~ {}: ({note})", entry.path);
	}
	match entry.change_type {
		ChangeType::Changed => writeln!(
			writer,
			"  ~ {}: {} -> {}",
			entry.path,
			render_value(entry.stored.as_ref()),
			render_value(entry.live.as_ref()),
		),
		ChangeType::Removed => writeln!(
			writer,
			"  - {}: {}",
			entry.path,
			render_value(entry.stored.as_ref())
		),
		ChangeType::Added => writeln!(
			writer,
			"  + {}: {}",
			entry.path,
			render_value(entry.live.as_ref())
		),
	}
}

impl ScanResults {
	/// Table with one row per manifest. An all-in-sync scan collapses to a
	/// single line.
	pub fn write_table<W: Write>(&self, writer: W, colored: bool) -> io::Result<()> {
		let mut tw = TabWriter::new(writer).padding(2);
		if self.all_in_sync() {
			writeln!(tw, "Drift scan: {} manifests, all in sync", self.total)?;
			return tw.flush();
		}

		writeln!(tw, "Drift scan: {} manifests", self.total)?;
		writeln!(tw, "NAMESPACE\tNAME\tKIND\tSTATUS")?;
		for result in &self.results {
			let label = status_label(result);
			// status is the last column, so escapes do not disturb alignment
			let status = if colored {
				status_style(result.status).paint(label).to_string()
			} else {
				label
			};
			writeln!(
				tw,
				"{}\t{}\t{}\t{status}",
				table_cell(&result.namespace),
				table_cell(&result.name),
				table_cell(&result.kind)
			)?;
		}
		tw.flush()
	}

	/// Plain-text digest meant to be embedded as context elsewhere.
	pub fn context_summary(&self) -> String {
		let mut out = String::from("Drift scan results\n");
		if self.all_in_sync() {
			out.push_str(&format!(
				"{} stored manifests, all in sync with the cluster.\n",
				self.total
			));
			return out;
		}

		out.push_str(&format!(
			"{} stored manifests: {} in sync, {} drifted, {} not in cluster, {} errors.\n\n",
			self.total, self.in_sync, self.drifted, self.missing, self.errors
		));
		for result in &self.results {
			let resource = result.resource();
			let line = match result.status {
				DriftStatus::InSync => continue,
				DriftStatus::Drifted => format!(
					"- {resource}: drifted ({} fields differ)",
					result.diffs.len()
				),
				DriftStatus::Missing => {
					format!("- {resource}: stored manifest exists but resource not found in cluster")
				}
				DriftStatus::Error => format!(
					"- {resource}: error ({})",
					result.error.as_deref().unwrap_or("unknown")
				),
			};
			out.push_str(&line);
			out.push('\n');
		}
		out.push_str("\nShow a single resource to see its field-level differences.\n");
		out
	}
}
