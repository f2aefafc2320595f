//! Scan command handler.

use std::io::Write;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use manifest_drift::ScanResults;

use super::{
	cancel_on_interrupt, open_session,
	util::{ColorMode, ProgressLine},
	GlobalArgs,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ScanFormat {
	/// Aligned table, one row per manifest
	#[default]
	Table,
	/// Plain-text digest for another tool to consume
	Context,
	/// Full results as JSON
	Json,
}

#[derive(Args)]
pub struct ScanArgs {
	/// Output format
	#[arg(long, default_value = "table", value_enum)]
	pub format: ScanFormat,
}

/// Run the scan command.
pub async fn run<W: Write>(global: &GlobalArgs, args: ScanArgs, writer: W) -> Result<()> {
	let session = open_session(global).await?;
	let cancel = cancel_on_interrupt();

	let mut progress = ProgressLine::stderr();
	let results = session
		.engine
		.scan_with_progress(&session.store, &cancel, |p| progress.update(p))
		.await;
	progress.clear();

	let results = results.context("drift scan failed")?;
	write_results(results.as_ref(), args.format, global.color, writer)
}

fn write_results<W: Write>(
	results: Option<&ScanResults>,
	format: ScanFormat,
	color: ColorMode,
	mut writer: W,
) -> Result<()> {
	match (format, results) {
		(ScanFormat::Json, results) => {
			serde_json::to_writer_pretty(&mut writer, &results)?;
			writeln!(writer)?;
		}
		(_, None) => writeln!(writer, "No stored manifests; nothing to scan.")?,
		(ScanFormat::Table, Some(results)) => {
			results.write_table(&mut writer, color.should_colorize())?;
		}
		(ScanFormat::Context, Some(results)) => write!(writer, "{}", results.context_summary())?,
	}
	writer.flush()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use manifest_drift::{DriftResult, ManifestRecord};

	use super::*;

	fn render(results: Option<&ScanResults>, format: ScanFormat) -> String {
		let mut out = Vec::new();
		write_results(results, format, ColorMode::Never, &mut out).unwrap();
		String::from_utf8(out).unwrap()
	}

	#[test]
	fn test_empty_store_message() {
		assert_eq!(
			render(None, ScanFormat::Table),
			"No stored manifests; nothing to scan.\n"
		);
		assert_eq!(render(None, ScanFormat::Json), "null\n");
	}

	#[test]
	fn test_json_output_carries_counts() {
		let results: ScanResults = [DriftResult::failed(
			&ManifestRecord::new("default", "web", "widget"),
			"unknown resource kind 'widget'",
		)]
		.into_iter()
		.collect();

		let out = render(Some(&results), ScanFormat::Json);
		let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
		assert_eq!(parsed["total"], 1);
		assert_eq!(parsed["errors"], 1);
		assert_eq!(parsed["results"][0]["status"], "error");
	}
}
