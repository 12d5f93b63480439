//! P-256 key agreement primitives.
//!
//! Provides type-safe wrappers around NIST P-256 ECDH with automatic
//! zeroization of secret material on drop. Public keys travel as uncompressed
//! X9.62 points (`0x04 || X || Y`), and the shared secret is the full
//! serialized product point, not just its X coordinate.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{AffinePoint, PublicKey as P256Public, SecretKey};
use rand_core::{OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{PUBLIC_KEY_SIZE, SECRET_KEY_SIZE};
use crate::error::{Error, Result};

/// Draw a valid scalar from the OS entropy source.
///
/// Candidates outside `[1, n)` are rejected and redrawn.
fn generate_secret_key() -> Result<SecretKey> {
    let mut candidate = Zeroizing::new([0u8; SECRET_KEY_SIZE]);
    loop {
        OsRng
            .try_fill_bytes(&mut candidate[..])
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;
        if let Ok(secret) = SecretKey::from_slice(&candidate[..]) {
            return Ok(secret);
        }
    }
}

fn scalar_mult(secret: &SecretKey, their_public: &PublicKey) -> Result<SharedSecret> {
    let product = their_public.0.to_projective() * *secret.to_nonzero_scalar();
    let encoded = AffinePoint::from(product).to_encoded_point(false);

    let bytes: [u8; PUBLIC_KEY_SIZE] = encoded
        .as_bytes()
        .try_into()
        .map_err(|_| Error::key_agreement("shared point is the identity"))?;
    Ok(SharedSecret(bytes))
}

/// An ephemeral (single-use) P-256 secret key.
///
/// Generated fresh for each handshake and consumed by the key agreement,
/// so it can never be reused.
pub struct EphemeralSecret(SecretKey);

impl EphemeralSecret {
    /// Generate a new random ephemeral secret.
    pub fn random() -> Result<Self> {
        generate_secret_key().map(Self)
    }

    /// Perform P-256 Diffie-Hellman key agreement.
    pub fn diffie_hellman(self, their_public: &PublicKey) -> Result<SharedSecret> {
        scalar_mult(&self.0, their_public)
    }
}

impl From<&EphemeralSecret> for PublicKey {
    fn from(secret: &EphemeralSecret) -> Self {
        PublicKey(secret.0.public_key())
    }
}

/// A static (long-term) P-256 secret key.
///
/// Held by the server for the process lifetime. The underlying scalar is
/// zeroized when dropped.
#[derive(Clone)]
pub struct StaticSecret(SecretKey);

impl StaticSecret {
    /// Generate a new random static secret.
    pub fn random() -> Result<Self> {
        generate_secret_key().map(Self)
    }

    /// Create from a big-endian serialized scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(Error::config(format!(
                "private key must be {} bytes, got {}",
                SECRET_KEY_SIZE,
                bytes.len()
            )));
        }
        SecretKey::from_slice(bytes)
            .map(Self)
            .map_err(|_| Error::config("private key is not a valid P-256 scalar"))
    }

    /// Perform P-256 Diffie-Hellman key agreement.
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> Result<SharedSecret> {
        scalar_mult(&self.0, their_public)
    }

    /// Export the big-endian scalar bytes.
    ///
    /// # Security
    ///
    /// The returned buffer is zeroized when dropped; do not copy it elsewhere.
    pub fn to_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_SIZE]> {
        let mut out = Zeroizing::new([0u8; SECRET_KEY_SIZE]);
        out.copy_from_slice(&self.0.to_bytes());
        out
    }
}

impl From<&StaticSecret> for PublicKey {
    fn from(secret: &StaticSecret) -> Self {
        PublicKey(secret.0.public_key())
    }
}

/// A P-256 public key.
///
/// Always a valid, non-identity point on the curve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(P256Public);

impl PublicKey {
    /// Decode an uncompressed X9.62 point.
    ///
    /// Fails with [`Error::KeyAgreement`] if the bytes are not exactly
    /// `0x04 || X || Y` for a point on the curve.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(Error::key_agreement(format!(
                "public key must be {} bytes, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )));
        }
        if bytes[0] != 0x04 {
            return Err(Error::key_agreement("public key is not an uncompressed point"));
        }
        P256Public::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| Error::key_agreement("public key is not a point on P-256"))
    }

    /// Serialize as an uncompressed X9.62 point.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let encoded = self.0.to_encoded_point(false);
        let mut out = [0u8; PUBLIC_KEY_SIZE];
        out.copy_from_slice(encoded.as_bytes());
        out
    }
}

/// The result of a P-256 Diffie-Hellman key agreement.
///
/// The serialized product point. Only ever fed into a
/// [`KeyDerivation`](crate::crypto::KeyDerivation) and then dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; PUBLIC_KEY_SIZE]);

impl SharedSecret {
    /// Get the raw shared secret bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}
