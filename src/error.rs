//! Error types for the veil transport.

use thiserror::Error;

/// Result type alias for veil operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or using an obfuscated connection.
#[derive(Error, Debug)]
pub enum Error {
    /// The entropy source failed while generating key material
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Peer public key did not decode to a point on the curve
    #[error("key agreement failed: {0}")]
    KeyAgreement(String),

    /// Key derivation stream failure
    #[error("key derivation failed: {0}")]
    Kdf(String),

    /// Record cipher could not be constructed from the supplied key
    #[error("cipher initialization failed: {0}")]
    CipherInit(String),

    /// Record failed AEAD verification (tampered, truncated or wrong key)
    #[error("authentication failed")]
    Authentication,

    /// Handshake protocol error
    #[error("handshake error: {0}")]
    Handshake(String),

    /// Pre-handshake mimicry exchange did not go as scripted
    #[error("mimicry error: {0}")]
    Mimicry(String),

    /// Invalid record framing
    #[error("invalid message format: {0}")]
    InvalidMessage(String),

    /// Operation timed out
    #[error("connection timeout after {0}ms")]
    Timeout(u64),

    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection registry is at capacity
    #[error("connection registry full ({0} live connections)")]
    RegistryFull(usize),
}

impl Error {
    /// Create a new key agreement error
    pub fn key_agreement(msg: impl Into<String>) -> Self {
        Error::KeyAgreement(msg.into())
    }

    /// Create a new handshake error
    pub fn handshake(msg: impl Into<String>) -> Self {
        Error::Handshake(msg.into())
    }

    /// Create a new mimicry error
    pub fn mimicry(msg: impl Into<String>) -> Self {
        Error::Mimicry(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if this error happened while establishing the connection.
    ///
    /// None of these are retried at this layer.
    pub fn is_handshake_failure(&self) -> bool {
        matches!(
            self,
            Error::KeyGeneration(_)
                | Error::KeyAgreement(_)
                | Error::Kdf(_)
                | Error::CipherInit(_)
                | Error::Handshake(_)
                | Error::Mimicry(_)
                | Error::Timeout(_)
        )
    }

    /// Check if the connection must be treated as compromised and closed.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(self, Error::Authentication | Error::InvalidMessage(_))
    }
}
