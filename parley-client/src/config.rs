//! Client configuration
//!
//! Stored as pretty JSON. Every field has a serde default so older or
//! hand-written files load cleanly.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use parley_common::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE, DEFAULT_PORT, PeerId};

/// File permissions for the config file on Unix (owner read/write only)
#[cfg(unix)]
const CONFIG_FILE_MODE: u32 = 0o600;

/// Errors loading, saving, or validating a [`ClientConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("relay URL must start with ws:// or wss://")]
    InvalidRelayUrl,
}

/// Tuning for the chunked transfer engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Raw bytes per `file-chunk`; both peers must agree on it
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Largest file that will be sent or accepted
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Pause between chunks, 0 to stream as fast as the channel accepts
    #[serde(default)]
    pub chunk_delay_ms: u64,

    /// Announce a SHA-256 of the file in `file-start`
    #[serde(default = "default_true")]
    pub include_hash: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            chunk_delay_ms: 0,
            include_hash: true,
        }
    }
}

impl TransferOptions {
    /// Pacing delay between chunks, if any
    pub fn chunk_delay(&self) -> Option<Duration> {
        (self.chunk_delay_ms > 0).then(|| Duration::from_millis(self.chunk_delay_ms))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }
}

/// Everything a client needs to join a relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Identity to reclaim on connect; a fresh one is issued when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<PeerId>,

    #[serde(default)]
    pub transfer: TransferOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            peer_id: None,
            transfer: TransferOptions::default(),
        }
    }
}

impl ClientConfig {
    /// Config pointing at a relay, with default transfer options
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.relay_url.starts_with("ws://") || self.relay_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidRelayUrl);
        }
        self.transfer.validate()
    }

    /// Read and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON, creating parent directories
    ///
    /// On Unix the file is restricted to the owner since it holds the
    /// reusable peer identity.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(CONFIG_FILE_MODE))?;
        }

        Ok(())
    }
}

fn default_relay_url() -> String {
    format!("ws://127.0.0.1:{DEFAULT_PORT}")
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_true() -> bool {
    true
}
