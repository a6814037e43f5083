//! Peer configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/shareit/peer.toml`
//! - Windows: `%APPDATA%/shareit/peer.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shareit_transfer::TransferConfig;

/// Peer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket endpoint of the signaling service.
    #[serde(default = "default_signaling_url")]
    pub signaling_url: String,

    /// Where received files are written. A leading `~` is the home directory.
    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    /// Wait for a chunk acknowledgement on the direct channel, in milliseconds.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Pause between relayed chunks, in milliseconds.
    #[serde(default = "default_relay_pacing_ms")]
    pub relay_pacing_ms: u64,

    /// Re-sends of an unacknowledged chunk before moving on.
    #[serde(default)]
    pub retransmit_limit: u32,

    /// Inactive transfers are dropped after this many seconds.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_signaling_url() -> String {
    "ws://localhost:3000/signal".into()
}

fn default_download_dir() -> String {
    "~/Downloads/shareit".into()
}

fn default_ack_timeout_ms() -> u64 {
    shareit_transfer::ACK_TIMEOUT.as_millis() as u64
}

fn default_relay_pacing_ms() -> u64 {
    shareit_transfer::RELAY_PACING.as_millis() as u64
}

fn default_idle_timeout_secs() -> u64 {
    shareit_transfer::DEFAULT_IDLE_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signaling_url: default_signaling_url(),
            download_dir: default_download_dir(),
            ack_timeout_ms: default_ack_timeout_ms(),
            relay_pacing_ms: default_relay_pacing_ms(),
            retransmit_limit: 0,
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Config {
    /// Loads configuration from the default location, creating it if missing.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    /// Loads configuration from `path`, writing the defaults there if the
    /// file does not exist yet.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Flow-control tunables for the transfer session.
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            relay_pacing: Duration::from_millis(self.relay_pacing_ms),
            retransmit_limit: self.retransmit_limit,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }

    /// Download directory with `~` expanded.
    pub fn download_path(&self) -> PathBuf {
        match self.download_dir.strip_prefix("~") {
            Some(rest) => home_dir().join(rest.trim_start_matches(['/', '\\'])),
            None => PathBuf::from(&self.download_dir),
        }
    }
}

fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    let var = "USERPROFILE";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";
    PathBuf::from(std::env::var(var).unwrap_or_else(|_| ".".into()))
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("shareit").join("peer.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        home_dir().join(".config").join("shareit").join("peer.toml")
    }
}
