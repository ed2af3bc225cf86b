// src/config.rs
//! Configuration management for the decoder host

use crate::error::{Result, TrackerError};
use crate::protocol::decoder::PROTOCOL;
use crate::session::AckSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub listen_host: String,
    pub listen_port: u16,
    /// Register unknown devices on first contact instead of dropping their frames
    pub auto_register: bool,
    /// Serial numbers known up front
    pub devices: Vec<String>,
    /// Acknowledgment switch per protocol name
    pub ack: BTreeMap<String, bool>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: 5004,
            auto_register: true,
            devices: Vec::new(),
            ack: BTreeMap::from([(PROTOCOL.to_string(), false)]),
        }
    }
}

impl AckSettings for DecoderConfig {
    fn ack_enabled(&self, protocol: &str) -> bool {
        self.ack.get(protocol).copied().unwrap_or(false)
    }
}

impl DecoderConfig {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| TrackerError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("gl200-decoder")
            .join("config.json"))
    }

    /// Update listener settings
    pub fn update_listener(&mut self, host: String, port: u16) {
        self.listen_host = host;
        self.listen_port = port;
    }

    pub fn set_ack(&mut self, protocol: &str, enabled: bool) {
        self.ack.insert(protocol.to_string(), enabled);
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}
