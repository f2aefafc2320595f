use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{util::BrokenPipeGuard, GlobalArgs};

mod commands;
mod telemetry;

#[cfg(all(
	target_os = "linux",
	feature = "mimalloc",
	not(feature = "system-alloc")
))]
#[global_allocator]
static GLOBAL: mimallocator::Mimalloc = mimallocator::Mimalloc;

#[derive(Parser)]
#[command(name = "driftctl")]
#[command(about = "Compare stored Kubernetes manifests with the live cluster", long_about = None)]
#[command(version = env!("DRIFTCTL_VERSION"))]
struct Cli {
	#[command(flatten)]
	global: GlobalArgs,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Compare every stored manifest against the cluster
	Scan(commands::scan::ScanArgs),

	/// Show field-level differences for one stored manifest
	Show(commands::show::ShowArgs),
}

fn main() -> Result<()> {
	let Cli { global, command } = Cli::parse();

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("failed to create tokio runtime")?;

	runtime.block_on(async move {
		let _telemetry = telemetry::init(global.log_level, global.log_format)?;
		let stdout = BrokenPipeGuard::new(std::io::stdout());

		match command {
			Commands::Scan(args) => commands::scan::run(&global, args, stdout).await,
			Commands::Show(args) => commands::show::run(&global, args, stdout).await,
		}
	})
}
