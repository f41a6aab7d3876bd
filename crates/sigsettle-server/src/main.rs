//! sigsettle - signal settlement service
//!
//! Usage:
//!   sigsettle --config config/default.toml
//!
//! The config path can also be set with `SIGSETTLE_CONFIG`.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use sigsettle_server::{AppConfig, Application};

#[derive(Parser, Debug)]
#[command(name = "sigsettle")]
#[command(about = "Trading signal settlement service", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    sigsettle_telemetry::init_logging()?;

    info!("Starting sigsettle v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(args.config)?;
    info!(bind_addr = %config.server.bind_addr, "Configuration loaded");

    let app = Application::build(config).await?;
    app.run().await?;

    Ok(())
}
