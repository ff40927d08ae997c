#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use anyhow::Result;
use clap::Parser;
use leafcam::Settings;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "leafcam", version, about = "Cotton leaf disease diagnosis with Grad-CAM explanations")]
struct Cli {
	/// Settings file. Defaults to ./leafcam.toml, then the user config directory.
	#[arg(long, global = true, env = "LEAFCAM_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with(tracing_subscriber::fmt::layer())
		.init();

	let cli = Cli::parse();
	let settings = Settings::load(cli.config.as_deref())?;

	commands::exec(settings, cli.command).await
}
