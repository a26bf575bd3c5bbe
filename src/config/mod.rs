//! Configuration management for peerview-core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Signaling relay configuration
    pub signaling: SignalingConfig,

    /// Session lifecycle configuration
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Relay endpoint URI (ws:// or wss://)
    pub relay_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Pause between a failed session and the next attempt, in milliseconds
    #[serde(default = "default_restart_pause_ms")]
    pub restart_pause_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            restart_pause_ms: default_restart_pause_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signaling: SignalingConfig {
                relay_uri: String::new(),
            },
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.signaling.relay_uri.is_empty() {
            return Err("Signaling relay URI must not be empty".into());
        }

        if !self.signaling.relay_uri.starts_with("ws://")
            && !self.signaling.relay_uri.starts_with("wss://")
        {
            return Err("Signaling relay URI must use the ws:// or wss:// scheme".into());
        }

        if self.session.restart_pause_ms == 0 {
            return Err("Session restart pause must be non-zero".into());
        }

        Ok(())
    }
}

fn default_restart_pause_ms() -> u64 {
    2000
}
