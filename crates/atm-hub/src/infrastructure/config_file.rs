//! TOML configuration file for the hub.
//!
//! The file is optional and every field has a default, so an empty file and
//! a missing file both produce [`HubConfig::default`]:
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 8025
//! outbound_queue_capacity = 64
//!
//! [endpoints]
//! queue_capacity = 256
//! ```

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{
    HubConfig, DEFAULT_OUTBOUND_CAPACITY, DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY,
};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),

    /// A queue capacity was zero.  Carries the offending key.
    #[error("{0} must be at least 1")]
    InvalidQueueCapacity(&'static str),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// On-disk shape of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HubFileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub endpoints: EndpointSection,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSection {
    /// IP address to bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Frames each session may have queued for its socket.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
}

/// Business endpoint queue settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointSection {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_outbound_queue_capacity() -> usize {
    DEFAULT_OUTBOUND_CAPACITY.get()
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY.get()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
        }
    }
}

impl Default for EndpointSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl HubFileConfig {
    /// Validates the file values and converts them to a [`HubConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `bind_address` is not an IP
    /// address and [`ConfigError::InvalidQueueCapacity`] for a zero capacity.
    pub fn into_hub_config(self) -> Result<HubConfig, ConfigError> {
        let ip: IpAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.server.bind_address.clone()))?;
        let endpoint_queue_capacity = NonZeroUsize::new(self.endpoints.queue_capacity)
            .ok_or(ConfigError::InvalidQueueCapacity("endpoints.queue_capacity"))?;
        let outbound_queue_capacity = NonZeroUsize::new(self.server.outbound_queue_capacity)
            .ok_or(ConfigError::InvalidQueueCapacity("server.outbound_queue_capacity"))?;
        Ok(HubConfig {
            bind_addr: SocketAddr::new(ip, self.server.port),
            endpoint_queue_capacity,
            outbound_queue_capacity,
        })
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<HubFileConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read (including when it
/// does not exist, since the caller named it explicitly) and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_file(path: &Path) -> Result<HubFileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
