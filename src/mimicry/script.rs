//! Exact-bytes scripted exchange.
//!
//! Each step names the role that sends it and the bytes (hex) it sends. The
//! receiving side reads exactly that many bytes and requires them to match.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::mimicry::Role;

/// Largest single step, in bytes.
pub const MAX_STEP_LEN: usize = 64 * 1024;

/// One message of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Sender of this step
    pub from: Role,
    /// Payload, hex encoded
    pub bytes: String,
}

/// Settings for the `script` strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Steps in wire order
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
}

impl ScriptConfig {
    /// True if the script has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A decoded script bound to one role.
#[derive(Debug, Clone)]
pub struct ScriptExchange {
    role: Role,
    steps: Vec<(Role, Vec<u8>)>,
}

impl ScriptExchange {
    /// Decode and validate a script.
    pub fn new(config: &ScriptConfig, role: Role) -> Result<Self> {
        let steps = config
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let bytes = hex::decode(&step.bytes)
                    .map_err(|e| Error::config(format!("script step {}: {}", i, e)))?;
                if bytes.is_empty() || bytes.len() > MAX_STEP_LEN {
                    return Err(Error::config(format!(
                        "script step {} must be 1..={} bytes, got {}",
                        i,
                        MAX_STEP_LEN,
                        bytes.len()
                    )));
                }
                Ok((step.from, bytes))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { role, steps })
    }

    /// Run every step in order.
    pub async fn perform<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut scratch = Vec::new();

        for (i, (from, bytes)) in self.steps.iter().enumerate() {
            if *from == self.role {
                stream.write_all(bytes).await?;
                stream.flush().await?;
                continue;
            }

            scratch.resize(bytes.len(), 0);
            stream.read_exact(&mut scratch).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    Error::mimicry(format!("peer closed during script step {}", i))
                } else {
                    Error::Network(e)
                }
            })?;

            if scratch != *bytes {
                return Err(Error::mimicry(format!("script step {} did not match", i)));
            }
        }

        Ok(())
    }
}
