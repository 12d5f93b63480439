//! # veil
//!
//! A pluggable-transport obfuscation layer. It disguises a TCP byte stream so
//! that an observer cannot fingerprint the protocol running inside it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Application Layer                     │
//! ├─────────────────────────────────────────────────────────┤
//! │  Record Transport (u16 length || sealed record)         │
//! ├─────────────────────────────────────────────────────────┤
//! │  Handshake (fixed-size padded frame, ephemeral ECDH)    │
//! ├─────────────────────────────────────────────────────────┤
//! │  Mimicry (optional scripted pre-handshake exchange)     │
//! ├─────────────────────────────────────────────────────────┤
//! │  Crypto Layer (P-256, X9.63 / HKDF, ChaCha20-Poly1305)  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! A connection goes through three steps:
//!
//! 1. **Mimicry**: if configured, both ends run a scripted exchange that
//!    looks like some other protocol.
//! 2. **Handshake**: the client sends one `chunk_size`-byte frame holding its
//!    ephemeral public key and random padding. Both ends derive the record
//!    key; the server never answers the frame.
//! 3. **Records**: application data travels as sealed, length-prefixed
//!    records.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod connection;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod mimicry;
pub mod transport;

#[cfg(feature = "server")]
pub mod server;

pub use error::{Error, Result};

/// Default timeout for connect and handshake operations (milliseconds)
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
