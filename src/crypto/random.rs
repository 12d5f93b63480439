//! Secure random number generation.
//!
//! Provides cryptographically secure random bytes using the operating
//! system's entropy source.

use std::ops::Range;

use rand::Rng;
use rand_core::{OsRng, RngCore};

use crate::error::{Error, Result};

/// Cryptographically secure random number generator.
///
/// Wraps the OS-provided entropy source (e.g., getrandom(2) on Linux,
/// BCryptGenRandom on Windows).
pub struct SecureRandom;

impl SecureRandom {
    /// Fill a buffer with random bytes, reporting entropy source failures.
    pub fn try_fill(dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| Error::KeyGeneration(e.to_string()))
    }

    /// Generate a fixed-size array of random bytes.
    pub fn bytes<const N: usize>() -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        Self::try_fill(&mut buf)?;
        Ok(buf)
    }

    /// Uniformly distributed value in `range` (no modulo bias).
    ///
    /// An empty range yields its start.
    pub fn in_range(range: Range<usize>) -> usize {
        if range.is_empty() {
            return range.start;
        }
        OsRng.gen_range(range)
    }
}

/// Generate random padding of the specified length.
pub fn random_padding(len: usize) -> Result<Vec<u8>> {
    let mut padding = vec![0u8; len];
    SecureRandom::try_fill(&mut padding)?;
    Ok(padding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_secure_random_fill() {
        let mut buf1 = [0u8; 32];
        let mut buf2 = [0u8; 32];

        SecureRandom::try_fill(&mut buf1).unwrap();
        SecureRandom::try_fill(&mut buf2).unwrap();

        assert!(!buf1.iter().all(|&b| b == 0));
        assert_ne!(buf1, buf2);
    }

    #[test]
    fn test_secure_random_bytes() {
        let bytes1: [u8; 16] = SecureRandom::bytes().unwrap();
        let bytes2: [u8; 16] = SecureRandom::bytes().unwrap();

        assert_ne!(bytes1, bytes2);
    }

    #[test]
    fn test_random_padding() {
        let padding = random_padding(100).unwrap();
        assert_eq!(padding.len(), 100);
        assert!(!padding.iter().all(|&b| b == 0));

        assert!(random_padding(0).unwrap().is_empty());
    }

    #[test]
    fn test_in_range() {
        let mut seen: HashSet<usize> = HashSet::new();
        for _ in 0..200 {
            let v = SecureRandom::in_range(0..512);
            assert!(v < 512);
            seen.insert(v);
        }
        assert!(seen.len() > 1);
    }

    #[test]
    fn test_in_range_empty() {
        assert_eq!(SecureRandom::in_range(100..100), 100);
    }
}
