//! Server side: register, disguise, handshake.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::connection::{ConnectionHandle, ConnectionId, ConnectionRegistry, ConnectionState};
use crate::error::{Error, Result};
use crate::handshake::{HandshakePhase, HandshakeServerConfig, Negotiated, ServerHandshake};
use crate::mimicry::{Mimicry, MimicryConfig, Role};
use crate::transport::ObfsStream;
use crate::HANDSHAKE_TIMEOUT_MS;

/// Turns accepted raw connections into obfuscated streams.
///
/// One instance serves every connection of a listener.
#[derive(Clone)]
pub struct ServerTransport {
    handshake: ServerHandshake,
    mimicry: Option<Arc<Mimicry>>,
    registry: Arc<ConnectionRegistry>,
    handshake_timeout: Duration,
}

impl ServerTransport {
    /// Create a transport that registers connections in `registry`.
    pub fn new(config: Arc<HandshakeServerConfig>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            handshake: ServerHandshake::new(config),
            mimicry: None,
            registry,
            handshake_timeout: Duration::from_millis(HANDSHAKE_TIMEOUT_MS),
        }
    }

    /// Set the pre-handshake disguise.
    ///
    /// A malformed config is logged and ignored.
    pub fn with_mimicry(mut self, config: Option<&MimicryConfig>) -> Self {
        self.mimicry = Mimicry::resolve(config, Role::Server).map(Arc::new);
        self
    }

    /// Bound the time a connection may take to finish mimicry and handshake.
    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    /// The shared connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Register a freshly accepted connection.
    ///
    /// The registry holds an empty state for it until the returned
    /// connection (or the stream it becomes) is dropped.
    pub fn new_connection<S>(
        &self,
        stream: S,
        peer_addr: Option<SocketAddr>,
    ) -> Result<PendingConnection<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let handle = self.registry.register(peer_addr)?;
        tracing::trace!("Registered connection {}", handle.id());

        Ok(PendingConnection {
            stream,
            handle,
            handshake: self.handshake.clone(),
            mimicry: self.mimicry.clone(),
            handshake_timeout: self.handshake_timeout,
        })
    }
}

/// An accepted connection that has not completed its handshake.
pub struct PendingConnection<S> {
    stream: S,
    handle: ConnectionHandle,
    handshake: ServerHandshake,
    mimicry: Option<Arc<Mimicry>>,
    handshake_timeout: Duration,
}

impl<S> PendingConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Registry ID of this connection.
    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// The registered connection state.
    pub fn state(&self) -> &Arc<ConnectionState> {
        self.handle.state()
    }

    /// Run mimicry and the server handshake.
    ///
    /// On failure the state is marked [`HandshakePhase::Failed`] and the
    /// registry entry is released.
    pub async fn handshake(self) -> Result<ObfsStream<S>> {
        let Self {
            mut stream,
            handle,
            handshake,
            mimicry,
            handshake_timeout,
        } = self;
        let state = Arc::clone(handle.state());

        let outcome = timeout(
            handshake_timeout,
            respond(&mut stream, &handshake, mimicry.as_deref(), &state),
        )
        .await
        .unwrap_or_else(|_| Err(Error::Timeout(handshake_timeout.as_millis() as u64)));

        match outcome {
            Ok(negotiated) => {
                state.populate(negotiated)?;
                ObfsStream::registered(stream, handle)
            }
            Err(e) => {
                state.set_phase(HandshakePhase::Failed);
                Err(e)
            }
        }
    }
}

async fn respond<S>(
    stream: &mut S,
    handshake: &ServerHandshake,
    mimicry: Option<&Mimicry>,
    state: &ConnectionState,
) -> Result<Negotiated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(mimicry) = mimicry {
        mimicry.perform(stream).await?;
    }

    let client_public = handshake.read_client_key(stream).await?;
    state.set_phase(HandshakePhase::KeyReceived);

    handshake.derive(client_public)
}
