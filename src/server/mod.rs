//! Server Infrastructure Module.
//!
//! Accepts TCP connections, runs the obfuscation handshake on each one in its
//! own task, then either relays the decrypted byte stream to an upstream
//! service or echoes records back.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Server                             │
//! │  ┌──────────────┐   ┌──────────────────┐   ┌─────────────┐  │
//! │  │ TCP Listener │──▶│ ServerTransport  │──▶│   Relay /   │  │
//! │  │              │   │ mimicry+handshake│   │    Echo     │  │
//! │  └──────────────┘   └────────┬─────────┘   └─────────────┘  │
//! │                              │                              │
//! │                              ▼                              │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ ConnectionRegistry (RAM only, entry per live conn)   │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;

pub use config::{ServerConfig, ServerConfigFile};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::connection::ConnectionRegistry;
use crate::error::Result;
use crate::transport::{ObfsStream, ServerTransport, MAX_RECORD_PAYLOAD};

/// Main server instance.
pub struct Server {
    config: Arc<ServerConfig>,
    transport: ServerTransport,
}

impl Server {
    /// Create a new server with its own connection registry.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.max_connections));
        Self::with_registry(config, registry)
    }

    /// Create a server that records connections in `registry`.
    pub fn with_registry(config: ServerConfig, registry: Arc<ConnectionRegistry>) -> Self {
        let transport = ServerTransport::new(Arc::new(config.handshake.clone()), registry)
            .with_mimicry(config.mimicry.as_ref())
            .with_handshake_timeout(config.handshake_timeout);

        Self {
            config: Arc::new(config),
            transport,
        }
    }

    /// Bind the configured address and serve forever.
    pub async fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.listen_addr, self.config.listen_port);
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!(
            "veil server listening on {} (max {} connections)",
            addr,
            self.registry().max_connections()
        );
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    tracing::debug!(
                        "Accepted {} ({} live connections)",
                        peer_addr,
                        self.connection_count()
                    );
                    let transport = self.transport.clone();
                    let config = Arc::clone(&self.config);

                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_connection(transport, &config, stream, peer_addr).await
                        {
                            if e.is_handshake_failure() {
                                tracing::debug!("Handshake failed from {}: {}", peer_addr, e);
                            } else if e.is_fatal_to_connection() {
                                tracing::warn!("Dropping connection from {}: {}", peer_addr, e);
                            } else {
                                tracing::debug!("Connection error from {}: {}", peer_addr, e);
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                }
            }
        }
    }

    async fn handle_connection(
        transport: ServerTransport,
        config: &ServerConfig,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        stream.set_nodelay(true)?;

        let pending = transport.new_connection(stream, Some(peer_addr))?;
        tracing::trace!("Registered connection {} for {}", pending.id(), peer_addr);

        let conn = pending.handshake().await?;
        if let Some(id) = conn.connection_id() {
            tracing::debug!(
                "Connection {} from {} established (client key {}..)",
                id,
                peer_addr,
                hex::encode(&conn.peer_public_key().to_bytes()[..9])
            );
        }

        match &config.forward_addr {
            Some(addr) => Self::relay(conn, addr, config.relay_idle_timeout).await,
            None => Self::echo(conn).await,
        }
    }

    /// Pump bytes between the obfuscated connection and an upstream service.
    ///
    /// Once either direction ends, the other gets `idle_timeout` to finish
    /// before the connection is dropped.
    async fn relay(
        conn: ObfsStream<TcpStream>,
        forward_addr: &str,
        idle_timeout: Duration,
    ) -> Result<()> {
        let upstream = TcpStream::connect(forward_addr).await?;
        upstream.set_nodelay(true)?;

        let (mut upstream_read, mut upstream_write) = upstream.into_split();
        let (mut obfs_read, mut obfs_write) = conn.into_split();

        let inbound = async {
            while let Some(data) = obfs_read.recv().await? {
                upstream_write.write_all(&data).await?;
            }
            upstream_write.shutdown().await?;
            Ok::<_, crate::Error>(())
        };

        let outbound = async {
            let mut buf = vec![0u8; MAX_RECORD_PAYLOAD];
            loop {
                let n = upstream_read.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                obfs_write.send(&buf[..n]).await?;
            }
            obfs_write.close().await?;
            Ok::<_, crate::Error>(())
        };

        tokio::pin!(inbound, outbound);
        let rest = tokio::select! {
            res = &mut inbound => {
                res?;
                tokio::time::timeout(idle_timeout, &mut outbound).await
            }
            res = &mut outbound => {
                res?;
                tokio::time::timeout(idle_timeout, &mut inbound).await
            }
        };

        match rest {
            Ok(res) => res,
            Err(_) => {
                tracing::debug!("Relay idle for {:?} after half-close", idle_timeout);
                Ok(())
            }
        }
    }

    async fn echo(mut conn: ObfsStream<TcpStream>) -> Result<()> {
        while let Some(data) = conn.recv().await? {
            conn.send(&data).await?;
        }
        conn.close().await
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.transport.registry().count()
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.transport.registry()
    }
}
