//! peerview-core - Main entry point
//!
//! Connects to the signaling relay, negotiates a peer session, and keeps
//! it alive until interrupted.

mod args;

use args::Args;
use clap::Parser;
use log::{info, warn};
use peerview_core::{Client, Config, LogSink};
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging with noise filtering for third-party WebRTC crates
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::new()
        .parse_filters(&std::env::var("PEERVIEW_LOG").unwrap_or_else(|_| log_level.to_string()))
        .filter_module("webrtc_ice", log::LevelFilter::Error)
        .filter_module("webrtc_dtls", log::LevelFilter::Error)
        .filter_module("webrtc_mdns", log::LevelFilter::Error)
        .init();

    info!("peerview-core v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match args.load_config() {
        Ok(cfg) => {
            info!("Loaded configuration from {:?}", args.config);
            cfg
        }
        Err(e) => {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        }
    };

    // Apply command line overrides
    if let Some(relay_uri) = args.relay_uri {
        config.signaling.relay_uri = relay_uri;
    }
    if let Some(pause) = args.restart_pause_ms {
        config.session.restart_pause_ms = pause;
    }

    config.validate()?;

    let client = Arc::new(Client::new(
        &config,
        Arc::new(LogSink),
        Box::new(|| info!("peer session online")),
        Box::new(|| info!("peer session offline")),
    )?);

    let runner = {
        let client = client.clone();
        tokio::spawn(async move {
            client.run().await;
        })
    };

    signal::ctrl_c().await?;
    info!("Shutdown requested");
    client.terminate();
    let _ = runner.await;

    Ok(())
}
