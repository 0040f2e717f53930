//! Server configuration
//!
//! Settings come from an optional TOML file; command line flags override
//! individual fields.

use routeguide::FeatureStore;
use routeguide_rpc::DEFAULT_MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,

    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,

    /// Feature dataset; the bundled dataset is used when unset
    #[serde(default)]
    pub features_path: Option<PathBuf>,

    #[serde(default)]
    pub transport: TransportConfig,
}

/// Per-connection transport limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Largest accepted frame payload in bytes
    #[serde(default = "TransportConfig::default_max_frame_size")]
    pub max_frame_size: usize,

    /// Request messages a client-streaming call may have in flight before
    /// the client waits for its handler
    #[serde(default = "TransportConfig::default_call_buffer")]
    pub call_buffer: usize,

    /// Response frames buffered per connection before handlers wait
    #[serde(default = "TransportConfig::default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl TransportConfig {
    const fn default_max_frame_size() -> usize {
        DEFAULT_MAX_FRAME_SIZE
    }

    const fn default_call_buffer() -> usize {
        64
    }

    const fn default_outbound_buffer() -> usize {
        256
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_size == 0 {
            return Err(ConfigError::Invalid("max_frame_size must be greater than zero".into()));
        }
        if self.call_buffer == 0 || self.outbound_buffer == 0 {
            return Err(ConfigError::Invalid("buffer sizes must be greater than zero".into()));
        }
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: Self::default_max_frame_size(),
            call_buffer: Self::default_call_buffer(),
            outbound_buffer: Self::default_outbound_buffer(),
        }
    }
}

impl ServerConfig {
    fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    const fn default_port() -> u16 {
        50051
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.transport.validate()?;
        Ok(config)
    }

    /// Read a TOML config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_features_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.features_path = Some(path.into());
        self
    }

    /// `host:port` to listen on.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the feature store this config points at.
    pub fn load_features(&self) -> routeguide::Result<FeatureStore> {
        match &self.features_path {
            Some(path) => FeatureStore::from_path(path),
            None => FeatureStore::bundled(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            features_path: None,
            transport: TransportConfig::default(),
        }
    }
}
