//! Record transport over an established handshake.
//!
//! After the handshake every message travels as a length-prefixed sealed
//! record:
//!
//! ```text
//! +-------------+--------------------------------------------+
//! | len: u16 BE | nonce (12) || ciphertext || tag (16)        |
//! +-------------+--------------------------------------------+
//! ```
//!
//! Payloads larger than [`MAX_RECORD_PAYLOAD`] are split across records.
//! A record that fails authentication is reported as
//! [`Error::Authentication`]; the connection is then unusable and must be
//! dropped.

pub mod client;
pub mod server;

pub use client::{dial, wrap, ClientConfig};
pub use server::{PendingConnection, ServerTransport};

use std::io::ErrorKind;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::crypto::{sealed_len, PublicKey, RecordCipher, CIPHER_OVERHEAD};
use crate::error::{Error, Result};
use crate::handshake::Negotiated;

/// Largest plaintext carried by one record.
pub const MAX_RECORD_PAYLOAD: usize = 16 * 1024;

/// Largest sealed record accepted from the wire.
pub const MAX_SEALED_RECORD: usize = sealed_len(MAX_RECORD_PAYLOAD);

const LENGTH_PREFIX: usize = 2;

/// An obfuscated connection: sealed records over a raw byte stream.
pub struct ObfsStream<S> {
    stream: S,
    cipher: Arc<RecordCipher>,
    peer_public_key: PublicKey,
    registration: Option<Arc<ConnectionHandle>>,
}

impl<S> ObfsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream whose handshake has completed.
    pub fn new(stream: S, negotiated: Negotiated) -> Self {
        Self {
            stream,
            cipher: negotiated.cipher,
            peer_public_key: negotiated.peer_public_key,
            registration: None,
        }
    }

    /// Wrap a server-side stream whose keys live in its registry entry.
    pub(crate) fn registered(stream: S, handle: ConnectionHandle) -> Result<Self> {
        let state = handle.state();
        let (Some(peer_public_key), Some(cipher)) = (state.peer_public_key(), state.cipher())
        else {
            return Err(Error::handshake(format!(
                "connection {} has no negotiated keys",
                handle.id()
            )));
        };

        Ok(Self {
            stream,
            cipher,
            peer_public_key,
            registration: Some(Arc::new(handle)),
        })
    }

    /// The peer's public key from the handshake.
    pub fn peer_public_key(&self) -> &PublicKey {
        &self.peer_public_key
    }

    /// Registry ID, for server-side connections.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.registration.as_ref().map(|h| h.id())
    }

    /// Seal and send `data`, splitting it across records as needed.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        write_records(&mut self.stream, &self.cipher, data).await
    }

    /// Receive and open one record.
    ///
    /// Returns `Ok(None)` when the peer closed the connection between
    /// records.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        read_record(&mut self.stream, &self.cipher).await
    }

    /// Shut down the write side and drop the connection.
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Split into independently owned read and write halves.
    ///
    /// Both halves share the record cipher; a server-side registry entry is
    /// released once both are dropped.
    pub fn into_split(self) -> (ObfsReader<ReadHalf<S>>, ObfsWriter<WriteHalf<S>>) {
        let (read_half, write_half) = tokio::io::split(self.stream);

        let reader = ObfsReader {
            reader: read_half,
            cipher: Arc::clone(&self.cipher),
            _registration: self.registration.clone(),
        };
        let writer = ObfsWriter {
            writer: write_half,
            cipher: self.cipher,
            _registration: self.registration,
        };
        (reader, writer)
    }
}

/// Read half of an [`ObfsStream`].
pub struct ObfsReader<R> {
    reader: R,
    cipher: Arc<RecordCipher>,
    _registration: Option<Arc<ConnectionHandle>>,
}

impl<R: AsyncRead + Unpin> ObfsReader<R> {
    /// Receive and open one record. `Ok(None)` on clean close.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        read_record(&mut self.reader, &self.cipher).await
    }
}

/// Write half of an [`ObfsStream`].
pub struct ObfsWriter<W> {
    writer: W,
    cipher: Arc<RecordCipher>,
    _registration: Option<Arc<ConnectionHandle>>,
}

impl<W: AsyncWrite + Unpin> ObfsWriter<W> {
    /// Seal and send `data`.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        write_records(&mut self.writer, &self.cipher, data).await
    }

    /// Shut down the write side.
    pub async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

async fn write_records<W>(writer: &mut W, cipher: &RecordCipher, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let record_count = data.len().div_ceil(MAX_RECORD_PAYLOAD).max(1);
    let mut out = Vec::with_capacity(data.len() + record_count * (LENGTH_PREFIX + CIPHER_OVERHEAD));

    let mut push = |chunk: &[u8]| -> Result<()> {
        let sealed = cipher.seal(chunk)?;
        // MAX_SEALED_RECORD < u16::MAX, so this cannot truncate.
        out.extend_from_slice(&(sealed.len() as u16).to_be_bytes());
        out.extend_from_slice(&sealed);
        Ok(())
    };

    if data.is_empty() {
        push(&[])?;
    } else {
        for chunk in data.chunks(MAX_RECORD_PAYLOAD) {
            push(chunk)?;
        }
    }

    writer.write_all(&out).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_record<R>(reader: &mut R, cipher: &RecordCipher) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; LENGTH_PREFIX];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::Network(e)),
    }

    let length = u16::from_be_bytes(header) as usize;
    if !(CIPHER_OVERHEAD..=MAX_SEALED_RECORD).contains(&length) {
        return Err(Error::InvalidMessage(format!(
            "record length {} outside {}..={}",
            length, CIPHER_OVERHEAD, MAX_SEALED_RECORD
        )));
    }

    let mut record = vec![0u8; length];
    reader.read_exact(&mut record).await.map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            Error::InvalidMessage("connection closed mid-record".into())
        } else {
            Error::Network(e)
        }
    })?;

    cipher.open(&record).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AeadKey, StaticSecret};
    use tokio::io::DuplexStream;

    fn negotiated(key: u8) -> Negotiated {
        Negotiated {
            peer_public_key: PublicKey::from(&StaticSecret::random().unwrap()),
            cipher: Arc::new(RecordCipher::new(&AeadKey::from_bytes([key; 32]))),
        }
    }

    fn pair(buffer: usize) -> (ObfsStream<DuplexStream>, ObfsStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(buffer);
        (
            ObfsStream::new(a, negotiated(1)),
            ObfsStream::new(b, negotiated(1)),
        )
    }

    #[tokio::test]
    async fn test_send_recv() {
        let (mut a, mut b) = pair(64 * 1024);

        a.send(b"hello").await.unwrap();
        a.send(b"").await.unwrap();
        assert_eq!(b.recv().await.unwrap().unwrap(), b"hello");
        assert_eq!(b.recv().await.unwrap().unwrap(), b"");

        b.send(b"world").await.unwrap();
        assert_eq!(a.recv().await.unwrap().unwrap(), b"world");
    }

    #[tokio::test]
    async fn test_large_payload_is_split() {
        let (mut a, mut b) = pair(128 * 1024);
        let payload: Vec<u8> = (0..MAX_RECORD_PAYLOAD * 2 + 10).map(|i| i as u8).collect();

        a.send(&payload).await.unwrap();

        let first = b.recv().await.unwrap().unwrap();
        let second = b.recv().await.unwrap().unwrap();
        let third = b.recv().await.unwrap().unwrap();
        assert_eq!(first.len(), MAX_RECORD_PAYLOAD);
        assert_eq!(second.len(), MAX_RECORD_PAYLOAD);
        assert_eq!(third.len(), 10);
        assert_eq!([first, second, third].concat(), payload);
    }

    #[tokio::test]
    async fn test_clean_close_is_none() {
        let (a, mut b) = pair(1024);
        a.close().await.unwrap();
        assert!(b.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tampered_record_fails_authentication() {
        let (raw, peer) = tokio::io::duplex(1024);
        let mut receiver = ObfsStream::new(peer, negotiated(1));

        let sealed = negotiated(1).cipher.seal(b"payload").unwrap();
        let mut framed = (sealed.len() as u16).to_be_bytes().to_vec();
        framed.extend_from_slice(&sealed);
        let last = framed.len() - 1;
        framed[last] ^= 0x01;

        let mut raw = raw;
        raw.write_all(&framed).await.unwrap();

        let err = receiver.recv().await.unwrap_err();
        assert!(matches!(err, Error::Authentication));
        assert!(err.is_fatal_to_connection());
    }

    #[tokio::test]
    async fn test_wrong_key_fails_authentication() {
        let (a, b) = tokio::io::duplex(1024);
        let mut sender = ObfsStream::new(a, negotiated(1));
        let mut receiver = ObfsStream::new(b, negotiated(2));

        sender.send(b"secret").await.unwrap();
        assert!(matches!(receiver.recv().await, Err(Error::Authentication)));
    }

    #[tokio::test]
    async fn test_bad_length_prefix() {
        for length in [0u16, (CIPHER_OVERHEAD - 1) as u16, (MAX_SEALED_RECORD + 1) as u16] {
            let (mut raw, peer) = tokio::io::duplex(1024);
            let mut receiver = ObfsStream::new(peer, negotiated(1));

            raw.write_all(&length.to_be_bytes()).await.unwrap();
            assert!(matches!(receiver.recv().await, Err(Error::InvalidMessage(_))));
        }
    }

    #[tokio::test]
    async fn test_truncated_record() {
        let (mut raw, peer) = tokio::io::duplex(1024);
        let mut receiver = ObfsStream::new(peer, negotiated(1));

        raw.write_all(&64u16.to_be_bytes()).await.unwrap();
        raw.write_all(&[0u8; 10]).await.unwrap();
        drop(raw);

        assert!(matches!(receiver.recv().await, Err(Error::InvalidMessage(_))));
    }

    #[tokio::test]
    async fn test_split_halves() {
        let (a, mut b) = pair(4096);
        let (mut reader, mut writer) = a.into_split();

        writer.send(b"from half").await.unwrap();
        assert_eq!(b.recv().await.unwrap().unwrap(), b"from half");

        b.send(b"to half").await.unwrap();
        assert_eq!(reader.recv().await.unwrap().unwrap(), b"to half");

        writer.close().await.unwrap();
        assert!(b.recv().await.unwrap().is_none());
    }

    #[test]
    fn test_registered_requires_negotiated_keys() {
        use crate::connection::ConnectionRegistry;

        let registry = Arc::new(ConnectionRegistry::new(4));
        let handle = registry.register(None).unwrap();
        let id = handle.id();

        let (a, _b) = tokio::io::duplex(64);
        assert!(matches!(ObfsStream::registered(a, handle), Err(Error::Handshake(_))));
        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn test_registration_released_after_both_halves_drop() {
        use crate::connection::ConnectionRegistry;

        let registry = Arc::new(ConnectionRegistry::new(4));

        let handle = registry.register(None).unwrap();
        handle.state().populate(negotiated(1)).unwrap();
        let (a, _b) = tokio::io::duplex(64);
        let stream = ObfsStream::registered(a, handle).unwrap();
        let id = stream.connection_id().unwrap();

        let (reader, writer) = stream.into_split();
        drop(reader);
        assert!(registry.contains(id));
        drop(writer);
        assert!(!registry.contains(id));
    }
}
