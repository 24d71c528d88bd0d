//! Rig Bridge
//!
//! Headless bridge daemon between amateur-radio logging applications and up
//! to four transceivers on their serial CAT/CI-V ports. The rig watcher
//! publishes state-change events as JSON; this binary emits them as NDJSON
//! on stdout, which is where the WebSocket fan-out picks them up.

mod ports;

use std::path::PathBuf;

use clap::Parser;
use rig_watch::{BridgeConfig, Broadcaster, RigSupervisor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "rigbridge", about = "CAT/CI-V rig state bridge")]
struct Cli {
    /// Read settings from this file instead of the platform config path
    #[arg(long)]
    config: Option<PathBuf>,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rigbridge=info,rig_watch=info,rig_protocol=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if cli.list_ports {
        for port in ports::list_serial_ports() {
            println!("{port}");
        }
        return;
    }

    let config = match &cli.config {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::error!("bad config file {}: {e}", path.display());
                    return;
                }
            },
            Err(e) => {
                tracing::error!("cannot read {}: {e}", path.display());
                return;
            }
        },
        None => BridgeConfig::load(),
    };

    tracing::info!("rigbridge starting");

    let (broadcaster, mut events) = Broadcaster::channel();
    let supervisor = RigSupervisor::new(config, broadcaster);
    supervisor.start().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(json) => println!("{json}"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                supervisor.shutdown().await;
                break;
            }
        }
    }
}
