//! Configuration management for dlnacast
//!
//! Handles config file loading/saving and the streaming port lookup.
//! Config is stored at ~/.config/dlnacast/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cast::store::FileSessionStore;
use crate::stream::server::DEFAULT_PORT;

/// Environment variable overriding the streaming port
pub const PORT_ENV: &str = "DLNACAST_PORT";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Streaming server port (default 8080)
    pub port: Option<u16>,
    /// Device used when `--device` is not given (id or name)
    pub default_device: Option<String>,
    /// LAN address put into streaming URLs instead of the detected one
    pub advertise_ip: Option<IpAddr>,
    /// How long discovery keeps searching, in seconds
    pub search_timeout_secs: Option<u64>,
    /// Position polling interval, in milliseconds
    pub poll_interval_ms: Option<u64>,
    /// Where the session record lives
    pub session_file: Option<PathBuf>,
}

impl Config {
    /// Get config file path (~/.config/dlnacast/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dlnacast").join("config.toml"))
    }

    /// Load config from the default path, or return default if not found
    pub fn load() -> Self {
        Self::path()
            .and_then(|p| Self::load_from(&p).ok())
            .unwrap_or_default()
    }

    /// Load config from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        toml::from_str(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Get the streaming port with fallback chain:
    /// 1. Environment variable DLNACAST_PORT
    /// 2. Port from config file
    /// 3. 8080
    pub fn port(&self) -> u16 {
        if let Some(port) = std::env::var(PORT_ENV).ok().and_then(|v| v.trim().parse().ok()) {
            return port;
        }
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs.unwrap_or(10))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(1000).max(50))
    }

    /// Session record location, if one can be determined
    pub fn session_file(&self) -> Option<PathBuf> {
        self.session_file
            .clone()
            .or_else(FileSessionStore::default_path)
    }
}
