//! Handshake configuration.
//!
//! A server config is generated once per deployment and distributed
//! out-of-band; the client config is derived from it and never carries the
//! private key.

use serde::{Deserialize, Serialize};

use crate::crypto::{
    EphemeralSecret, KeyDerivation, PublicKey, RecordCipher, SecureRandom, StaticSecret,
    NONCE_SIZE, TAG_SIZE,
};
use crate::error::{Error, Result};
use crate::handshake::{BASE_FRAME_SIZE, FRAME_SIZE_JITTER, MIN_CHUNK_SIZE};

/// Server side of the handshake configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "ServerConfigRepr", into = "ServerConfigRepr")]
pub struct HandshakeServerConfig {
    static_secret: StaticSecret,
    public_key: PublicKey,
    chunk_size: usize,
    kdf: KeyDerivation,
}

impl HandshakeServerConfig {
    /// Build a config from an existing static key.
    pub fn new(
        static_secret: StaticSecret,
        chunk_size: usize,
        kdf: KeyDerivation,
    ) -> Result<Self> {
        check_chunk_size(chunk_size)?;
        let public_key = PublicKey::from(&static_secret);
        Ok(Self {
            static_secret,
            public_key,
            chunk_size,
            kdf,
        })
    }

    /// Generate a fresh deployment configuration.
    ///
    /// The frame size is `1024 + uniform[0, 512) + nonce + tag`, so it differs
    /// between deployments but stays fixed for the life of one. Before
    /// returning, a throwaway ephemeral key runs the full agreement and
    /// derivation path against the new static key and round-trips a sample
    /// record through the resulting cipher.
    pub fn generate() -> Result<Self> {
        let static_secret = StaticSecret::random()?;
        let public_key = PublicKey::from(&static_secret);
        let kdf = KeyDerivation::default();

        check_key_agreement(&static_secret, &public_key, kdf)?;

        let chunk_size =
            BASE_FRAME_SIZE + SecureRandom::in_range(0..FRAME_SIZE_JITTER) + NONCE_SIZE + TAG_SIZE;

        Self::new(static_secret, chunk_size, kdf)
    }

    /// Switch the key derivation procedure used by this deployment.
    pub fn with_kdf(mut self, kdf: KeyDerivation) -> Self {
        self.kdf = kdf;
        self
    }

    /// Derive the matching client configuration.
    pub fn client_config(&self) -> HandshakeClientConfig {
        HandshakeClientConfig {
            server_public_key: self.public_key.clone(),
            chunk_size: self.chunk_size,
            kdf: self.kdf,
        }
    }

    /// The server's long-lived secret.
    pub fn static_secret(&self) -> &StaticSecret {
        &self.static_secret
    }

    /// The server's long-lived public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Size of the handshake frame in bytes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Key derivation procedure.
    pub fn kdf(&self) -> KeyDerivation {
        self.kdf
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        check_chunk_size(self.chunk_size)?;
        if PublicKey::from(&self.static_secret) != self.public_key {
            return Err(Error::config("public_key does not match private_key"));
        }
        Ok(())
    }
}

/// Client side of the handshake configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ClientConfigRepr", into = "ClientConfigRepr")]
pub struct HandshakeClientConfig {
    /// Server's long-lived public key
    pub server_public_key: PublicKey,
    /// Size of the handshake frame in bytes
    pub chunk_size: usize,
    /// Key derivation procedure, always copied from the server config
    pub kdf: KeyDerivation,
}

impl HandshakeClientConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        check_chunk_size(self.chunk_size)
    }
}

fn check_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size < MIN_CHUNK_SIZE {
        return Err(Error::config(format!(
            "chunk_size {} is below the minimum of {}",
            chunk_size, MIN_CHUNK_SIZE
        )));
    }
    Ok(())
}

fn check_key_agreement(
    static_secret: &StaticSecret,
    public_key: &PublicKey,
    kdf: KeyDerivation,
) -> Result<()> {
    let scratch = EphemeralSecret::random()?;
    let scratch_public = PublicKey::from(&scratch);
    let context = scratch_public.to_bytes();

    let initiator = kdf.derive(&scratch.diffie_hellman(public_key)?, &context)?;
    let responder = kdf.derive(&static_secret.diffie_hellman(&scratch_public)?, &context)?;

    let sample: [u8; 16] = SecureRandom::bytes()?;
    let sealed = RecordCipher::new(&initiator).seal(&sample)?;
    let opened = RecordCipher::new(&responder).open(&sealed)?;
    if opened != sample {
        return Err(Error::key_agreement("generated key pair failed self-test"));
    }
    Ok(())
}

/// On-disk form: keys as standard base64.
#[derive(Serialize, Deserialize)]
struct ServerConfigRepr {
    public_key: String,
    private_key: String,
    chunk_size: usize,
    #[serde(default)]
    kdf: KeyDerivation,
}

impl TryFrom<ServerConfigRepr> for HandshakeServerConfig {
    type Error = Error;

    fn try_from(repr: ServerConfigRepr) -> Result<Self> {
        let secret_bytes = zeroize::Zeroizing::new(decode_b64("private_key", &repr.private_key)?);
        let static_secret = StaticSecret::from_bytes(&secret_bytes)?;
        check_chunk_size(repr.chunk_size)?;

        let public_bytes = decode_b64("public_key", &repr.public_key)?;
        let public_key = PublicKey::from_sec1_bytes(&public_bytes)
            .map_err(|e| Error::config(format!("public_key: {}", e)))?;

        let config = Self {
            static_secret,
            public_key,
            chunk_size: repr.chunk_size,
            kdf: repr.kdf,
        };
        config.validate()?;
        Ok(config)
    }
}

impl From<HandshakeServerConfig> for ServerConfigRepr {
    fn from(config: HandshakeServerConfig) -> Self {
        Self {
            public_key: encode_b64(&config.public_key.to_bytes()),
            private_key: encode_b64(&config.static_secret.to_bytes()[..]),
            chunk_size: config.chunk_size,
            kdf: config.kdf,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ClientConfigRepr {
    server_public_key: String,
    chunk_size: usize,
    #[serde(default)]
    kdf: KeyDerivation,
}

impl TryFrom<ClientConfigRepr> for HandshakeClientConfig {
    type Error = Error;

    fn try_from(repr: ClientConfigRepr) -> Result<Self> {
        let public_bytes = decode_b64("server_public_key", &repr.server_public_key)?;
        let server_public_key = PublicKey::from_sec1_bytes(&public_bytes)
            .map_err(|e| Error::config(format!("server_public_key: {}", e)))?;

        let config = Self {
            server_public_key,
            chunk_size: repr.chunk_size,
            kdf: repr.kdf,
        };
        config.validate()?;
        Ok(config)
    }
}

impl From<HandshakeClientConfig> for ClientConfigRepr {
    fn from(config: HandshakeClientConfig) -> Self {
        Self {
            server_public_key: encode_b64(&config.server_public_key.to_bytes()),
            chunk_size: config.chunk_size,
            kdf: config.kdf,
        }
    }
}

fn encode_b64(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.encode(bytes)
}

fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>> {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD
        .decode(value)
        .map_err(|e| Error::config(format!("invalid base64 in {}: {}", field, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PUBLIC_KEY_SIZE;

    #[test]
    fn test_generated_chunk_size_bounds() {
        let overhead = NONCE_SIZE + TAG_SIZE;
        for _ in 0..32 {
            let config = HandshakeServerConfig::generate().unwrap();
            let chunk = config.chunk_size();
            assert!(chunk >= BASE_FRAME_SIZE + overhead);
            assert!(chunk < BASE_FRAME_SIZE + FRAME_SIZE_JITTER + overhead);
        }
    }

    #[test]
    fn test_client_config_copies_public_fields_only() {
        let server = HandshakeServerConfig::generate().unwrap();
        let client = server.client_config();

        assert_eq!(&client.server_public_key, server.public_key());
        assert_eq!(client.chunk_size, server.chunk_size());
        assert_eq!(client.kdf, server.kdf());

        let json = serde_json::to_string(&client).unwrap();
        assert!(!json.contains("private"));
        let secret_b64 = encode_b64(&server.static_secret().to_bytes()[..]);
        assert!(!json.contains(&secret_b64));
    }

    #[test]
    fn test_server_config_file_roundtrip() {
        let config = HandshakeServerConfig::generate()
            .unwrap()
            .with_kdf(KeyDerivation::Hkdf);

        let text = toml::to_string(&config).unwrap();
        let restored: HandshakeServerConfig = toml::from_str(&text).unwrap();

        assert_eq!(restored.public_key(), config.public_key());
        assert_eq!(restored.chunk_size(), config.chunk_size());
        assert_eq!(restored.kdf(), KeyDerivation::Hkdf);
    }

    #[test]
    fn test_client_config_json_roundtrip() {
        let client = HandshakeServerConfig::generate().unwrap().client_config();
        let json = serde_json::to_string(&client).unwrap();
        let restored: HandshakeClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, client);
    }

    #[test]
    fn test_kdf_defaults_when_missing() {
        let server = HandshakeServerConfig::generate().unwrap();
        let json = format!(
            r#"{{"server_public_key":"{}","chunk_size":{}}}"#,
            encode_b64(&server.public_key().to_bytes()),
            server.chunk_size()
        );
        let client: HandshakeClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(client.kdf, KeyDerivation::X963);
    }

    #[test]
    fn test_chunk_size_minimum_enforced() {
        let secret = StaticSecret::random().unwrap();
        let min = HandshakeServerConfig::new(secret.clone(), MIN_CHUNK_SIZE, KeyDerivation::X963);
        assert!(min.is_ok());
        assert!(matches!(
            HandshakeServerConfig::new(secret, PUBLIC_KEY_SIZE, KeyDerivation::X963),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_mismatched_public_key_rejected() {
        let config = HandshakeServerConfig::generate().unwrap();
        let other = HandshakeServerConfig::generate().unwrap();

        let mut repr = ServerConfigRepr::from(config);
        repr.public_key = encode_b64(&other.public_key().to_bytes());

        assert!(matches!(HandshakeServerConfig::try_from(repr), Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_client_key_rejected() {
        let json = r#"{"server_public_key":"AAAA","chunk_size":1200}"#;
        assert!(serde_json::from_str::<HandshakeClientConfig>(json).is_err());

        let json = r#"{"server_public_key":"not base64!","chunk_size":1200}"#;
        assert!(serde_json::from_str::<HandshakeClientConfig>(json).is_err());
    }
}
