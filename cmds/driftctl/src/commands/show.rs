//! Show command handler.

use std::io::Write;

use anyhow::Result;
use clap::{Args, ValueEnum};

use super::{cancel_on_interrupt, open_session, GlobalArgs};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ShowFormat {
	#[default]
	Text,
	Json,
}

#[derive(Args)]
pub struct ShowArgs {
	/// Namespace of the stored manifest
	pub namespace: String,

	/// Application (object name) of the stored manifest
	pub app: String,

	/// Resource kind, as named in the store (e.g. deployment, svc)
	pub kind: String,

	/// Output format
	#[arg(long, default_value = "text", value_enum)]
	pub format: ShowFormat,
}

/// Run the show command.
pub async fn run<W: Write>(global: &GlobalArgs, args: ShowArgs, mut writer: W) -> Result<()> {
	let session = open_session(global).await?;
	let cancel = cancel_on_interrupt();

	let result = session
		.engine
		.detail(&session.store, &args.namespace, &args.app, &args.kind, &cancel)
		.await;

	match args.format {
		ShowFormat::Text => result.write_details(&mut writer)?,
		ShowFormat::Json => {
			serde_json::to_writer_pretty(&mut writer, &result)?;
			writeln!(writer)?;
		}
	}
	writer.flush()?;
	Ok(())
}
