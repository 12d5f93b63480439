//! Client side: dial, disguise, handshake.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::handshake::{ClientHandshake, HandshakeClientConfig};
use crate::mimicry::{Mimicry, MimicryConfig, Role};
use crate::transport::ObfsStream;
use crate::HANDSHAKE_TIMEOUT_MS;

fn default_timeout_secs() -> u64 {
    HANDSHAKE_TIMEOUT_MS / 1000
}

/// Client configuration, usually loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server hostname or IP address
    pub server_addr: String,
    /// Server port
    pub server_port: u16,
    /// Handshake parameters issued by the server operator
    pub handshake: HandshakeClientConfig,
    /// Optional pre-handshake disguise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimicry: Option<MimicryConfig>,
    /// TCP connect timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Mimicry plus handshake timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

impl ClientConfig {
    /// Create a config with default timeouts and no mimicry.
    pub fn new(
        server_addr: impl Into<String>,
        server_port: u16,
        handshake: HandshakeClientConfig,
    ) -> Self {
        Self {
            server_addr: server_addr.into(),
            server_port,
            handshake,
            mimicry: None,
            connect_timeout_secs: default_timeout_secs(),
            handshake_timeout_secs: default_timeout_secs(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.server_addr.is_empty() {
            return Err(Error::config("server_addr cannot be empty"));
        }
        if self.server_port == 0 {
            return Err(Error::config("server_port cannot be 0"));
        }
        if self.connect_timeout_secs == 0 || self.handshake_timeout_secs == 0 {
            return Err(Error::config("timeouts must be at least one second"));
        }
        self.handshake.validate()
    }

    /// TCP connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Mimicry plus handshake timeout.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

/// Connect to the server and establish an obfuscated stream.
pub async fn dial(config: &ClientConfig) -> Result<ObfsStream<TcpStream>> {
    config.validate()?;

    let connect_timeout = config.connect_timeout();
    let stream = timeout(
        connect_timeout,
        TcpStream::connect((config.server_addr.as_str(), config.server_port)),
    )
    .await
    .map_err(|_| Error::Timeout(connect_timeout.as_millis() as u64))?
    .map_err(Error::Network)?;

    stream.set_nodelay(true)?;
    tracing::debug!(
        "Connected to {}:{}, starting handshake",
        config.server_addr,
        config.server_port
    );

    let handshake_timeout = config.handshake_timeout();
    timeout(handshake_timeout, wrap(stream, config))
        .await
        .map_err(|_| Error::Timeout(handshake_timeout.as_millis() as u64))?
}

/// Run mimicry and the client handshake over an already connected stream.
///
/// No timeout is applied; [`dial`] wraps this in one.
pub async fn wrap<S>(mut stream: S, config: &ClientConfig) -> Result<ObfsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(mimicry) = Mimicry::resolve(config.mimicry.as_ref(), Role::Client) {
        mimicry.perform(&mut stream).await?;
        tracing::trace!("Client {} mimicry complete", mimicry.kind().as_str());
    }

    let mut handshake = ClientHandshake::new(config.handshake.clone())?;
    let negotiated = handshake.perform(&mut stream).await?;

    Ok(ObfsStream::new(stream, negotiated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::{HandshakeServerConfig, ServerHandshake};
    use crate::mimicry::{BannerConfig, BannerLine};
    use std::sync::Arc;

    fn configs() -> (HandshakeServerConfig, ClientConfig) {
        let server = HandshakeServerConfig::generate().unwrap();
        let client = ClientConfig::new("127.0.0.1", 9000, server.client_config());
        (server, client)
    }

    #[test]
    fn test_json_defaults() {
        let (_, client) = configs();
        let mut value = serde_json::to_value(&client).unwrap();
        let object = value.as_object_mut().unwrap();
        object.remove("connect_timeout_secs");
        object.remove("handshake_timeout_secs");
        assert!(!object.contains_key("mimicry"));

        let restored: ClientConfig = serde_json::from_value(value).unwrap();
        assert_eq!(restored, client);
        assert_eq!(restored.connect_timeout(), Duration::from_millis(HANDSHAKE_TIMEOUT_MS));
    }

    #[test]
    fn test_validation() {
        let (_, client) = configs();
        assert!(client.validate().is_ok());

        let mut bad = client.clone();
        bad.server_addr.clear();
        assert!(bad.validate().is_err());

        let mut bad = client.clone();
        bad.server_port = 0;
        assert!(bad.validate().is_err());

        let mut bad = client;
        bad.handshake_timeout_secs = 0;
        assert!(matches!(bad.validate(), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_wrap_interoperates_with_server_handshake() {
        let (server_config, client_config) = configs();
        let server = ServerHandshake::new(Arc::new(server_config));

        let (client_io, mut server_io) = tokio::io::duplex(8192);
        let server_task = tokio::spawn(async move {
            let negotiated = server.accept(&mut server_io).await.unwrap();
            ObfsStream::new(server_io, negotiated)
        });

        let mut client = wrap(client_io, &client_config).await.unwrap();
        let mut server = server_task.await.unwrap();

        client.send(b"ping").await.unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap(), b"ping");
        server.send(b"pong").await.unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), b"pong");
    }

    #[tokio::test]
    async fn test_mimicry_runs_before_key_frame() {
        let (server_config, mut client_config) = configs();
        let chunk_size = server_config.chunk_size();
        client_config.mimicry = Some(MimicryConfig {
            selector: "banner".into(),
            script: None,
            banner: Some(BannerConfig {
                lines: vec![BannerLine {
                    from: Role::Client,
                    text: "HELLO".into(),
                }],
                ..Default::default()
            }),
        });

        let (client_io, mut tap) = tokio::io::duplex(8192);
        wrap(client_io, &client_config).await.unwrap();

        let mut wire = vec![0u8; 7 + chunk_size];
        tokio::io::AsyncReadExt::read_exact(&mut tap, &mut wire)
            .await
            .unwrap();
        assert_eq!(&wire[..7], b"HELLO\r\n");
        assert_eq!(wire[7], 0x04);
    }

    #[tokio::test]
    async fn test_dial_times_out_on_silent_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            // Accept and hold the socket without speaking.
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let (_, mut client_config) = configs();
        client_config.server_port = port;
        client_config.handshake_timeout_secs = 1;
        client_config.mimicry = Some(MimicryConfig {
            selector: "banner".into(),
            script: None,
            banner: Some(BannerConfig {
                lines: vec![BannerLine {
                    from: Role::Server,
                    text: "220 ready".into(),
                }],
                ..Default::default()
            }),
        });

        let result = dial(&client_config).await;
        assert!(matches!(result, Err(Error::Timeout(1000))));
        server.abort();
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (_, mut client_config) = configs();
        client_config.server_port = port;

        let result = dial(&client_config).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_failed_write_is_reported() {
        let (_, client_config) = configs();
        let (client_io, server_io) = tokio::io::duplex(64);
        drop(server_io);

        assert!(wrap(client_io, &client_config).await.is_err());
    }
}
