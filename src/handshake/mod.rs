//! Padded ECDH handshake.
//!
//! The client opens every connection with a single fixed-size frame:
//!
//! ```text
//! 0                65                                   chunk_size
//! +----------------+------------------------------------+
//! | 0x04 || X || Y |        random padding              |
//! +----------------+------------------------------------+
//!   client ephemeral P-256 public key (uncompressed)
//! ```
//!
//! The server is a passive responder: it never answers the frame. Both sides
//! compute the same shared point (client ephemeral x server static), derive a
//! record key with the deployment's [`KeyDerivation`], and switch to sealed
//! records. The frame length is fixed per deployment but randomized between
//! deployments (see [`HandshakeServerConfig::generate`]).
//!
//! ## State machine
//!
//! ```text
//! client: Idle -> KeySent     -> Derived
//! server: Idle -> KeyReceived -> Derived
//!         any step on error   -> Failed (terminal; close the connection)
//! ```

mod client;
mod config;
mod frame;
mod server;

use std::sync::Arc;

pub use client::ClientHandshake;
pub use config::{HandshakeClientConfig, HandshakeServerConfig};
pub use frame::{build_frame, parse_frame};
pub use server::ServerHandshake;

use crate::crypto::{
    KeyDerivation, PublicKey, RecordCipher, SharedSecret, CIPHER_OVERHEAD, PUBLIC_KEY_SIZE,
};
use crate::error::Result;

/// Base handshake frame payload size before randomization
pub const BASE_FRAME_SIZE: usize = 1024;

/// Exclusive upper bound of the random amount added to [`BASE_FRAME_SIZE`]
pub const FRAME_SIZE_JITTER: usize = 512;

/// Smallest frame that still holds a public key plus minimal padding
pub const MIN_CHUNK_SIZE: usize = PUBLIC_KEY_SIZE + CIPHER_OVERHEAD;

/// Handshake progress for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Nothing exchanged yet
    Idle,
    /// Client wrote its key frame
    KeySent,
    /// Server read and decoded the client key frame
    KeyReceived,
    /// Record cipher is ready
    Derived,
    /// Handshake aborted; the connection must be closed
    Failed,
}

/// Key material negotiated by a successful handshake.
#[derive(Clone)]
pub struct Negotiated {
    /// The other side's public key: the server's static key on the client,
    /// the client's ephemeral key on the server
    pub peer_public_key: PublicKey,
    /// Record cipher keyed by the derived connection key
    pub cipher: Arc<RecordCipher>,
}

/// Derive the connection cipher.
///
/// The derivation context is always the client's ephemeral public key, on
/// both sides.
fn derive_cipher(
    kdf: KeyDerivation,
    shared: &SharedSecret,
    client_public: &PublicKey,
) -> Result<Arc<RecordCipher>> {
    let key = kdf.derive(shared, &client_public.to_bytes())?;
    let cipher = RecordCipher::from_key_bytes(key.as_bytes())?;
    Ok(Arc::new(cipher))
}
