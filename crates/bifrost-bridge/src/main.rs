//! Bifrost bridge binary.
//!
//! # Usage
//!
//! ```bash
//! # Local daemon, pick the sole device automatically
//! bifrost-bridge --server multiworld.example:38281
//!
//! # Explicit device and room password
//! bifrost-bridge --server multiworld.example --device "SD2SNES COM3" --password hunter2
//! ```

use bifrost_bridge::{BridgeDriver, DriverOptions};
use bifrost_core::BridgeConfig;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Bridge between a console-memory daemon and a multiworld server
#[derive(Parser, Debug)]
#[command(name = "bifrost-bridge")]
#[command(about = "Dual-transport bridge for console-backed multiworld play")]
#[command(version)]
struct Args {
    /// WebSocket URL of the console daemon
    #[arg(long, default_value = "ws://localhost:8080")]
    console: String,

    /// Multiworld server address (host or host:port)
    #[arg(short, long)]
    server: Option<String>,

    /// Device URI to attach to (a sole device auto-attaches)
    #[arg(short, long)]
    device: Option<String>,

    /// Room password
    #[arg(short, long)]
    password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Bifrost bridge starting");
    tracing::info!("Console daemon at {}", args.console);
    match &args.server {
        Some(server) => tracing::info!("Multiworld server at {}", server),
        None => tracing::warn!("No server configured - console side only"),
    }

    let options = DriverOptions {
        console_url: args.console,
        server_address: args.server,
        device_uri: args.device,
        password: args.password,
    };

    let driver = BridgeDriver::new(BridgeConfig::default(), options);
    driver.run().await?;

    Ok(())
}
