//! Client half of the handshake.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::crypto::{EphemeralSecret, PublicKey};
use crate::error::{Error, Result};
use crate::handshake::{
    build_frame, derive_cipher, HandshakeClientConfig, HandshakePhase, Negotiated,
};

/// Client handshake for a single connection.
///
/// Holds a fresh ephemeral key pair. The client never waits for the server:
/// it already knows the server's static key, so once its frame is written it
/// derives the record cipher on its own.
pub struct ClientHandshake {
    config: HandshakeClientConfig,
    ephemeral: Option<EphemeralSecret>,
    ephemeral_public: PublicKey,
    phase: HandshakePhase,
}

impl ClientHandshake {
    /// Prepare a handshake with a newly generated ephemeral key.
    pub fn new(config: HandshakeClientConfig) -> Result<Self> {
        config.validate()?;
        let ephemeral = EphemeralSecret::random()?;
        let ephemeral_public = PublicKey::from(&ephemeral);

        Ok(Self {
            config,
            ephemeral: Some(ephemeral),
            ephemeral_public,
            phase: HandshakePhase::Idle,
        })
    }

    /// This connection's ephemeral public key, as sent in the frame.
    pub fn ephemeral_public(&self) -> &PublicKey {
        &self.ephemeral_public
    }

    /// Current handshake phase.
    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Write the key frame and derive the record cipher.
    ///
    /// Can run once; the ephemeral secret is consumed by the agreement.
    pub async fn perform<S>(&mut self, stream: &mut S) -> Result<Negotiated>
    where
        S: AsyncWrite + Unpin,
    {
        if self.phase != HandshakePhase::Idle {
            return Err(Error::handshake("client handshake already performed"));
        }

        match self.run(stream).await {
            Ok(negotiated) => {
                self.phase = HandshakePhase::Derived;
                Ok(negotiated)
            }
            Err(e) => {
                self.phase = HandshakePhase::Failed;
                Err(e)
            }
        }
    }

    async fn run<S>(&mut self, stream: &mut S) -> Result<Negotiated>
    where
        S: AsyncWrite + Unpin,
    {
        let frame = build_frame(&self.ephemeral_public, self.config.chunk_size)?;
        stream.write_all(&frame).await?;
        stream.flush().await?;
        self.phase = HandshakePhase::KeySent;

        let ephemeral = self
            .ephemeral
            .take()
            .ok_or_else(|| Error::handshake("ephemeral key already consumed"))?;
        let shared = ephemeral.diffie_hellman(&self.config.server_public_key)?;
        let cipher = derive_cipher(self.config.kdf, &shared, &self.ephemeral_public)?;

        Ok(Negotiated {
            peer_public_key: self.config.server_public_key.clone(),
            cipher,
        })
    }
}
