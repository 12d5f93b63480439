//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::handshake::HandshakeServerConfig;
use crate::mimicry::MimicryConfig;
use crate::transport::ClientConfig;
use crate::HANDSHAKE_TIMEOUT_MS;

/// Default cap on live connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Default grace period for the other relay direction once one side is done.
pub const DEFAULT_RELAY_IDLE_TIMEOUT_SECS: u64 = 30;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: String,
    /// Listen port
    pub listen_port: u16,
    /// Upstream to relay decrypted traffic to; records are echoed when unset
    pub forward_addr: Option<String>,
    /// Key material and frame size
    pub handshake: HandshakeServerConfig,
    /// Optional pre-handshake disguise
    pub mimicry: Option<MimicryConfig>,
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Deadline for mimicry plus handshake on each connection
    pub handshake_timeout: Duration,
    /// How long a relay waits on the open direction after the other one ends
    pub relay_idle_timeout: Duration,
}

impl ServerConfig {
    /// Create a new configuration with freshly generated handshake keys.
    pub fn new_random(listen_addr: impl Into<String>, listen_port: u16) -> Result<Self> {
        Ok(Self {
            listen_addr: listen_addr.into(),
            listen_port,
            forward_addr: None,
            handshake: HandshakeServerConfig::generate()?,
            mimicry: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            handshake_timeout: Duration::from_millis(HANDSHAKE_TIMEOUT_MS),
            relay_idle_timeout: Duration::from_secs(DEFAULT_RELAY_IDLE_TIMEOUT_SECS),
        })
    }

    /// Client configuration for reaching this server at `server_addr`.
    pub fn client_config(&self, server_addr: impl Into<String>) -> ClientConfig {
        let mut client = ClientConfig::new(
            server_addr,
            self.listen_port,
            self.handshake.client_config(),
        );
        client.mimicry = self.mimicry.clone();
        client
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.is_empty() {
            return Err(Error::config("listen_addr cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(Error::config("max_connections must be positive"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(Error::config("handshake_timeout must be positive"));
        }
        if self.relay_idle_timeout.is_zero() {
            return Err(Error::config("relay_idle_timeout must be positive"));
        }
        if matches!(&self.forward_addr, Some(addr) if addr.is_empty()) {
            return Err(Error::config("forward_addr cannot be empty"));
        }
        self.handshake.validate()
    }
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_handshake_timeout_secs() -> u64 {
    HANDSHAKE_TIMEOUT_MS / 1000
}

fn default_relay_idle_timeout_secs() -> u64 {
    DEFAULT_RELAY_IDLE_TIMEOUT_SECS
}

/// Configuration file format for serialization.
///
/// Plain values come before the `[handshake]` and `[mimicry]` tables.
#[derive(Serialize, Deserialize)]
pub struct ServerConfigFile {
    /// Listen address
    pub listen_addr: String,
    /// Listen port
    pub listen_port: u16,
    /// Upstream address (host:port)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_addr: Option<String>,
    /// Maximum concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Handshake timeout (seconds)
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Relay idle timeout after half-close (seconds)
    #[serde(default = "default_relay_idle_timeout_secs")]
    pub relay_idle_timeout_secs: u64,
    /// Handshake keys (base64) and frame size
    pub handshake: HandshakeServerConfig,
    /// Pre-handshake disguise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimicry: Option<MimicryConfig>,
}

impl ServerConfigFile {
    /// Convert to runtime configuration.
    pub fn to_config(&self) -> Result<ServerConfig> {
        let config = ServerConfig {
            listen_addr: self.listen_addr.clone(),
            listen_port: self.listen_port,
            forward_addr: self.forward_addr.clone(),
            handshake: self.handshake.clone(),
            mimicry: self.mimicry.clone(),
            max_connections: self.max_connections,
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            relay_idle_timeout: Duration::from_secs(self.relay_idle_timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }

    /// Create from runtime configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            listen_addr: config.listen_addr.clone(),
            listen_port: config.listen_port,
            forward_addr: config.forward_addr.clone(),
            max_connections: config.max_connections,
            handshake_timeout_secs: config.handshake_timeout.as_secs(),
            relay_idle_timeout_secs: config.relay_idle_timeout.as_secs(),
            handshake: config.handshake.clone(),
            mimicry: config.mimicry.clone(),
        }
    }
}
