//! Record sealing with ChaCha20-Poly1305.
//!
//! Every record carries its own random 96-bit nonce:
//!
//! ```text
//! nonce (12) || ciphertext (len(plaintext)) || tag (16)
//! ```
//!
//! Random nonces are only safe while the number of records sealed under one
//! key stays far below the 2^48 birthday bound of the nonce space. A key lives
//! for a single connection, which keeps record counts orders of magnitude
//! under that bound.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead as AeadTrait, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{SecureRandom, CIPHER_OVERHEAD, KEY_SIZE, NONCE_SIZE};
use crate::error::{Error, Result};

/// A symmetric key for record sealing.
///
/// Automatically zeroized when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
    /// Create a new AEAD key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with care - this is secret key material.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AeadKey(..)")
    }
}

/// Per-connection record cipher.
///
/// `seal` and `open` take `&self` and never block, so one instance can be
/// shared between the read and write halves of a connection.
pub struct RecordCipher {
    cipher: ChaCha20Poly1305,
}

impl RecordCipher {
    /// Create a new record cipher keyed by the derived connection key.
    pub fn new(key: &AeadKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }

    /// Create a record cipher from raw key bytes, checking their length.
    pub fn from_key_bytes(key: &[u8]) -> Result<Self> {
        let cipher = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| Error::CipherInit(format!("invalid key length {}", key.len())))?;
        Ok(Self { cipher })
    }

    /// Seal `plaintext` into `nonce || ciphertext || tag`.
    ///
    /// No associated data is authenticated.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_SIZE];
        SecureRandom::try_fill(&mut nonce)?;

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::InvalidMessage("plaintext too large to seal".into()))?;

        let mut record = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        record.extend_from_slice(&nonce);
        record.extend_from_slice(&ciphertext);
        Ok(record)
    }

    /// Open a sealed record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] for any record that does not verify:
    /// wrong key, flipped bits, truncation, or a record too short to hold a
    /// nonce and tag. Unverified plaintext is never returned.
    pub fn open(&self, record: &[u8]) -> Result<Vec<u8>> {
        if record.len() < CIPHER_OVERHEAD {
            return Err(Error::Authentication);
        }

        let (nonce, ciphertext) = record.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Authentication)
    }
}

/// Sealed record length for a given plaintext length.
pub const fn sealed_len(plaintext_len: usize) -> usize {
    plaintext_len + CIPHER_OVERHEAD
}
