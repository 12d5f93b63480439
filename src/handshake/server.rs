//! Server half of the handshake.

use std::io::ErrorKind;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::crypto::PublicKey;
use crate::error::{Error, Result};
use crate::handshake::{derive_cipher, parse_frame, HandshakeServerConfig, Negotiated};

/// Server handshake, shared by every accepted connection.
///
/// Cheap to clone; all clones share one [`HandshakeServerConfig`].
#[derive(Clone)]
pub struct ServerHandshake {
    config: Arc<HandshakeServerConfig>,
}

impl ServerHandshake {
    /// Create a handshake responder for the given deployment.
    pub fn new(config: Arc<HandshakeServerConfig>) -> Self {
        Self { config }
    }

    /// Deployment configuration.
    pub fn config(&self) -> &HandshakeServerConfig {
        &self.config
    }

    /// Read one full frame and decode the client's ephemeral key.
    ///
    /// Short reads are retried until exactly `chunk_size` bytes arrive or the
    /// peer closes the connection.
    pub async fn read_client_key<S>(&self, stream: &mut S) -> Result<PublicKey>
    where
        S: AsyncRead + Unpin,
    {
        let chunk_size = self.config.chunk_size();
        let mut frame = vec![0u8; chunk_size];

        stream.read_exact(&mut frame).await.map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                Error::handshake(format!(
                    "connection closed before the {}-byte key frame arrived",
                    chunk_size
                ))
            } else {
                Error::Network(e)
            }
        })?;

        parse_frame(&frame, chunk_size)
    }

    /// Agree on the shared secret with a decoded client key and build the cipher.
    pub fn derive(&self, client_public: PublicKey) -> Result<Negotiated> {
        let shared = self.config.static_secret().diffie_hellman(&client_public)?;
        let cipher = derive_cipher(self.config.kdf(), &shared, &client_public)?;

        Ok(Negotiated {
            peer_public_key: client_public,
            cipher,
        })
    }

    /// Run the whole server side: read the frame, agree, derive.
    pub async fn accept<S>(&self, stream: &mut S) -> Result<Negotiated>
    where
        S: AsyncRead + Unpin,
    {
        let client_public = self.read_client_key(stream).await?;
        self.derive(client_public)
    }
}
