//! Command handlers and the setup they share.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Args;
use manifest_drift::{
	config::CONFIG_FILE_NAME, ClusterConnection, ClusterTarget, DirectoryStore, DriftConfig,
	DriftEngine, KindRegistry, KubeCluster, Resolver,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use self::util::ColorMode;
use crate::telemetry::LogFormat;

pub mod scan;
pub mod show;
pub mod util;

/// Flags accepted by every subcommand.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
	/// Config file to use instead of searching for .driftctl.yaml
	#[arg(long, global = true)]
	pub config: Option<PathBuf>,

	/// Root of the stored manifests (<namespace>/<app>/<kind>.yaml)
	#[arg(long, global = true)]
	pub manifest_dir: Option<PathBuf>,

	/// Path to the kubeconfig file
	#[arg(long, global = true)]
	pub kubeconfig: Option<PathBuf>,

	/// Kubeconfig context to use
	#[arg(long, global = true, conflicts_with = "api_server")]
	pub context: Option<String>,

	/// Use the first context that points at this API server URL
	#[arg(long, global = true)]
	pub api_server: Option<String>,

	/// Per-manifest fetch timeout in seconds
	#[arg(long, global = true)]
	pub timeout: Option<u64>,

	/// Log level (error, warn, info, debug, trace). Overrides RUST_LOG
	#[arg(long, global = true)]
	pub log_level: Option<Level>,

	/// Log line format on stderr
	#[arg(long, global = true, default_value = "auto", value_enum)]
	pub log_format: LogFormat,

	/// Controls color in table output
	#[arg(long, global = true, default_value = "auto", value_enum)]
	pub color: ColorMode,
}

/// Everything a command needs to talk to the store and the cluster.
pub struct Session {
	pub engine: DriftEngine,
	pub store: DirectoryStore,
}

fn load_config(global: &GlobalArgs) -> Result<DriftConfig> {
	if let Some(path) = &global.config {
		return DriftConfig::load_from_file(path);
	}
	let cwd = std::env::current_dir().context("failed to determine working directory")?;
	Ok(DriftConfig::load_from_directory(&cwd)?.unwrap_or_default())
}

/// Cluster selection from the config file with flags layered on top.
///
/// `--context` and `--api-server` replace the file's selection as a pair,
/// so a flag never combines with the other selector from the file.
fn cluster_target(config: &DriftConfig, global: &GlobalArgs) -> ClusterTarget {
	let mut target = config.cluster_target();
	if let Some(kubeconfig) = &global.kubeconfig {
		target.kubeconfig = Some(kubeconfig.clone());
	}
	if global.context.is_some() || global.api_server.is_some() {
		target.context.clone_from(&global.context);
		target.api_server.clone_from(&global.api_server);
	}
	target
}

fn manifest_root(config: &DriftConfig, global: &GlobalArgs) -> Result<PathBuf> {
	match global.manifest_dir.clone().or_else(|| config.manifest_directory()) {
		Some(root) => Ok(root),
		None => bail!(
			"no manifest directory: pass --manifest-dir or set manifests.directory in {CONFIG_FILE_NAME}"
		),
	}
}

fn fetch_timeout(config: &DriftConfig, global: &GlobalArgs) -> Duration {
	global
		.timeout
		.map_or_else(|| config.fetch_timeout(), Duration::from_secs)
}

/// Load configuration, connect to the cluster and assemble the engine.
pub async fn open_session(global: &GlobalArgs) -> Result<Session> {
	let config = load_config(global)?;
	let root = manifest_root(&config, global)?;
	let target = cluster_target(&config, global);

	let conn = ClusterConnection::connect(&target)
		.await
		.context("connecting to cluster")?;

	let mut resolver = Resolver::new(config.resource_table());
	if config.discovery_enabled() {
		match KindRegistry::discover(conn.client()).await {
			Ok(registry) => resolver = resolver.with_registry(registry),
			Err(e) => warn!(
				error = %manifest_drift::classify::render_error(&e),
				"resource discovery failed; falling back to built-in kinds"
			),
		}
	}

	let store = DirectoryStore::new(root);
	info!(
		cluster = %conn.cluster_identifier(),
		manifests = %store.root().display(),
		discovery = resolver.has_registry(),
		"opened session"
	);

	let engine = DriftEngine::builder()
		.cluster(Arc::new(KubeCluster::from_connection(&conn)))
		.resolver(resolver)
		.canonicalizer(config.canonicalizer())
		.differ(config.differ())
		.fetch_timeout(fetch_timeout(&config, global))
		.build();

	Ok(Session { engine, store })
}

/// Token cancelled on the first Ctrl-C.
pub fn cancel_on_interrupt() -> CancellationToken {
	let cancel = CancellationToken::new();
	let on_interrupt = cancel.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			warn!("interrupted, cancelling");
			on_interrupt.cancel();
		}
	});
	cancel
}
