//! Cryptographic primitives for veil.
//!
//! This module provides:
//! - P-256 Elliptic Curve Diffie-Hellman key agreement
//! - Key derivation (ANSI X9.63 counter-hash or HKDF-SHA256)
//! - ChaCha20-Poly1305 record sealing with random nonces
//! - Secure random number generation
//!
//! All secret material is zeroized on drop to prevent memory leakage.

mod aead;
pub mod kdf;
mod keys;
mod random;

pub use aead::{sealed_len, AeadKey, RecordCipher};
pub use kdf::{Hkdf, KeyDerivation};
pub use keys::{EphemeralSecret, PublicKey, SharedSecret, StaticSecret};
pub use random::{random_padding, SecureRandom};

/// Size of symmetric keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of AEAD nonce in bytes (96 bits for ChaCha20-Poly1305)
pub const NONCE_SIZE: usize = 12;

/// Size of AEAD authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Bytes a sealed record adds on top of its plaintext
pub const CIPHER_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Size of an uncompressed SEC1 / X9.62 P-256 point: tag byte + X + Y
pub const PUBLIC_KEY_SIZE: usize = 1 + 2 * 32;

/// Size of a serialized P-256 private scalar
pub const SECRET_KEY_SIZE: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_key_agreement_and_sealing() {
        // Server generates static keypair (done once)
        let server_static = StaticSecret::random().unwrap();
        let server_public = PublicKey::from(&server_static);

        // Client generates ephemeral keypair (per connection)
        let client_ephemeral = EphemeralSecret::random().unwrap();
        let client_public = PublicKey::from(&client_ephemeral);

        let client_shared = client_ephemeral.diffie_hellman(&server_public).unwrap();
        let server_shared = server_static.diffie_hellman(&client_public).unwrap();
        assert_eq!(client_shared.as_bytes(), server_shared.as_bytes());

        let context = client_public.to_bytes();
        let client_key = KeyDerivation::X963.derive(&client_shared, &context).unwrap();
        let server_key = KeyDerivation::X963.derive(&server_shared, &context).unwrap();
        assert_eq!(client_key, server_key);

        let client_cipher = RecordCipher::new(&client_key);
        let server_cipher = RecordCipher::new(&server_key);

        let sealed = client_cipher.seal(b"Hello, hidden world!").unwrap();
        let opened = server_cipher.open(&sealed).unwrap();
        assert_eq!(opened, b"Hello, hidden world!");
    }

    #[test]
    fn test_sizes() {
        assert_eq!(PUBLIC_KEY_SIZE, 65);
        assert_eq!(CIPHER_OVERHEAD, 28);
    }
}
