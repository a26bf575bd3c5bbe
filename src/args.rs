use clap::Parser;
use std::path::PathBuf;

use peerview_core::config;

#[derive(Parser, Debug)]
#[command(name = "peerview-core")]
#[command(author = "Peerview Team")]
#[command(version = "0.2.0")]
#[command(about = "Client-side peer session establishment and resilience", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/peerview-core.toml")]
    pub config: PathBuf,

    /// Signaling relay URI (ws:// or wss://)
    #[arg(long)]
    pub relay_uri: Option<String>,

    /// Pause between failed sessions in milliseconds
    #[arg(long)]
    pub restart_pause_ms: Option<u64>,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        config::Config::load(&self.config)
    }
}
