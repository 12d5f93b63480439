//! Fixed-size handshake frame.

use crate::crypto::{random_padding, PublicKey, PUBLIC_KEY_SIZE};
use crate::error::{Error, Result};
use crate::handshake::MIN_CHUNK_SIZE;

/// Build a `chunk_size`-byte frame: the serialized key followed by random filler.
pub fn build_frame(public_key: &PublicKey, chunk_size: usize) -> Result<Vec<u8>> {
    if chunk_size < MIN_CHUNK_SIZE {
        return Err(Error::config(format!(
            "chunk_size {} cannot hold a public key and padding",
            chunk_size
        )));
    }

    let mut frame = random_padding(chunk_size)?;
    frame[..PUBLIC_KEY_SIZE].copy_from_slice(&public_key.to_bytes());
    Ok(frame)
}

/// Extract the sender's public key from a received frame, ignoring the padding.
pub fn parse_frame(frame: &[u8], chunk_size: usize) -> Result<PublicKey> {
    if frame.len() != chunk_size {
        return Err(Error::handshake(format!(
            "expected a {}-byte frame, got {}",
            chunk_size,
            frame.len()
        )));
    }
    if frame.len() < PUBLIC_KEY_SIZE {
        return Err(Error::handshake("frame too short for a public key"));
    }

    PublicKey::from_sec1_bytes(&frame[..PUBLIC_KEY_SIZE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::StaticSecret;

    #[test]
    fn test_frame_layout() {
        let public = PublicKey::from(&StaticSecret::random().unwrap());
        let frame = build_frame(&public, 1100).unwrap();

        assert_eq!(frame.len(), 1100);
        assert_eq!(&frame[..PUBLIC_KEY_SIZE], &public.to_bytes()[..]);
        // Padding is random, not zero-filled
        assert!(!frame[PUBLIC_KEY_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_padding_differs_between_frames() {
        let public = PublicKey::from(&StaticSecret::random().unwrap());
        let a = build_frame(&public, 1100).unwrap();
        let b = build_frame(&public, 1100).unwrap();

        assert_eq!(a[..PUBLIC_KEY_SIZE], b[..PUBLIC_KEY_SIZE]);
        assert_ne!(a[PUBLIC_KEY_SIZE..], b[PUBLIC_KEY_SIZE..]);
    }

    #[test]
    fn test_parse_ignores_padding() {
        let public = PublicKey::from(&StaticSecret::random().unwrap());
        let mut frame = build_frame(&public, 1100).unwrap();
        frame[PUBLIC_KEY_SIZE..].fill(0xff);

        assert_eq!(parse_frame(&frame, 1100).unwrap(), public);
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        let public = PublicKey::from(&StaticSecret::random().unwrap());
        let frame = build_frame(&public, 1100).unwrap();

        assert!(matches!(parse_frame(&frame[..1099], 1100), Err(Error::Handshake(_))));

        let mut corrupted = frame.clone();
        corrupted[..PUBLIC_KEY_SIZE].fill(0x00);
        assert!(matches!(parse_frame(&corrupted, 1100), Err(Error::KeyAgreement(_))));
    }

    #[test]
    fn test_build_rejects_tiny_chunk() {
        let public = PublicKey::from(&StaticSecret::random().unwrap());
        assert!(build_frame(&public, PUBLIC_KEY_SIZE).is_err());
    }
}
