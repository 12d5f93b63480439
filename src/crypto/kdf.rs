//! Key Derivation Functions.
//!
//! Two procedures turn a raw ECDH shared secret into a 32-byte record key:
//!
//! - ANSI X9.63 counter-hash expansion over SHA-256, bound to a context
//!   (the client's ephemeral public key)
//! - HKDF-SHA256 with empty salt and empty info
//!
//! A deployment picks exactly one of them through [`KeyDerivation`] in its
//! handshake configuration; client configs are derived from server configs, so
//! both roles always agree on it.

use hkdf::Hkdf as HkdfImpl;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::crypto::{AeadKey, SharedSecret, KEY_SIZE};
use crate::error::{Error, Result};

/// HKDF key derivation using SHA-256.
pub struct Hkdf {
    prk: HkdfImpl<Sha256>,
}

impl Hkdf {
    /// Create a new HKDF instance from input keying material.
    ///
    /// # Arguments
    ///
    /// * `salt` - Optional salt; `None` is treated as a zero-filled block
    /// * `ikm` - Input keying material (e.g., shared secret from DH)
    pub fn new(salt: Option<&[u8]>, ikm: &[u8]) -> Self {
        Self {
            prk: HkdfImpl::new(salt, ikm),
        }
    }

    /// Expand to a fixed-size array.
    pub fn expand_fixed<const N: usize>(&self, info: &[u8]) -> Result<[u8; N]> {
        let mut okm = [0u8; N];
        self.prk
            .expand(info, &mut okm)
            .map_err(|_| Error::Kdf("HKDF expansion failed".into()))?;
        Ok(okm)
    }

    /// Derive an AEAD key.
    pub fn derive_aead_key(&self, info: &[u8]) -> Result<AeadKey> {
        let key_bytes = Zeroizing::new(self.expand_fixed::<KEY_SIZE>(info)?);
        Ok(AeadKey::from_bytes(*key_bytes))
    }
}

/// ANSI X9.63 KDF over SHA-256.
///
/// Hashes `secret || counter || shared_info` with a big-endian 32-bit counter
/// starting at 1, concatenating digests until `N` bytes are available.
pub fn x963_kdf<const N: usize>(secret: &[u8], shared_info: &[u8]) -> Result<[u8; N]> {
    let digest_len = <Sha256 as Digest>::output_size();
    let blocks = (N + digest_len - 1) / digest_len;
    if blocks > u32::MAX as usize {
        return Err(Error::Kdf("X9.63 output length too large".into()));
    }

    let mut stream = Zeroizing::new(Vec::with_capacity(blocks * digest_len));
    for counter in 1..=blocks as u32 {
        let mut hasher = Sha256::new();
        hasher.update(secret);
        hasher.update(counter.to_be_bytes());
        hasher.update(shared_info);
        stream.extend_from_slice(&hasher.finalize());
    }

    let mut okm = [0u8; N];
    okm.copy_from_slice(&stream[..N]);
    Ok(okm)
}

/// Key derivation procedure shared by both ends of a deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyDerivation {
    /// ANSI X9.63 counter-hash, context = client ephemeral public key
    #[default]
    X963,
    /// HKDF-SHA256, empty salt and info; the context is not used
    Hkdf,
}

impl KeyDerivation {
    /// Derive the 32-byte record key for one connection.
    ///
    /// Deterministic: the same `(secret, context)` always gives the same key.
    pub fn derive(&self, secret: &SharedSecret, context: &[u8]) -> Result<AeadKey> {
        match self {
            KeyDerivation::X963 => {
                let key = Zeroizing::new(x963_kdf::<KEY_SIZE>(secret.as_bytes(), context)?);
                Ok(AeadKey::from_bytes(*key))
            }
            KeyDerivation::Hkdf => Hkdf::new(None, secret.as_bytes()).derive_aead_key(&[]),
        }
    }

    /// Parse a configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "x963" => Some(KeyDerivation::X963),
            "hkdf" => Some(KeyDerivation::Hkdf),
            _ => None,
        }
    }

    /// Name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyDerivation::X963 => "x963",
            KeyDerivation::Hkdf => "hkdf",
        }
    }
}
