//! Line-oriented banner exchange.
//!
//! Models text protocols that greet with a banner line (SMTP, FTP, SSH). Each
//! line is sent terminated by CRLF. A line may contain one `{nonce}`
//! placeholder: the sender substitutes fresh random hex, and the receiver
//! accepts any text between the fixed prefix and suffix.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::crypto::SecureRandom;
use crate::error::{Error, Result};
use crate::mimicry::Role;

const NONCE_PLACEHOLDER: &str = "{nonce}";
const NONCE_BYTES: usize = 8;

/// One banner line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerLine {
    /// Sender of this line
    pub from: Role,
    /// Line text without terminator; may contain one `{nonce}`
    pub text: String,
}

/// Settings for the `banner` strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerConfig {
    /// Lines in wire order
    #[serde(default)]
    pub lines: Vec<BannerLine>,
    /// Longest line accepted from the peer, excluding the terminator
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
}

fn default_max_line_len() -> usize {
    BannerConfig::DEFAULT_MAX_LINE_LEN
}

impl BannerConfig {
    /// Default for [`BannerConfig::max_line_len`].
    pub const DEFAULT_MAX_LINE_LEN: usize = 1024;

    /// True if there are no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for BannerConfig {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            max_line_len: Self::DEFAULT_MAX_LINE_LEN,
        }
    }
}

#[derive(Debug, Clone)]
struct Template {
    from: Role,
    prefix: String,
    suffix: Option<String>,
}

impl Template {
    fn parse(index: usize, line: &BannerLine, max_line_len: usize) -> Result<Self> {
        let text = &line.text;
        if text.is_empty() {
            return Err(Error::config(format!("banner line {} is empty", index)));
        }
        if text.contains(|c: char| c == '\r' || c == '\n') {
            return Err(Error::config(format!("banner line {} contains a line terminator", index)));
        }

        let (prefix, suffix) = match text.split_once(NONCE_PLACEHOLDER) {
            Some((prefix, suffix)) => {
                if suffix.contains(NONCE_PLACEHOLDER) {
                    return Err(Error::config(format!(
                        "banner line {} has more than one {}",
                        index, NONCE_PLACEHOLDER
                    )));
                }
                (prefix.to_string(), Some(suffix.to_string()))
            }
            None => (text.clone(), None),
        };

        let template = Self {
            from: line.from,
            prefix,
            suffix,
        };
        if template.rendered_len() > max_line_len {
            return Err(Error::config(format!(
                "banner line {} is longer than max_line_len {}",
                index, max_line_len
            )));
        }
        Ok(template)
    }

    fn rendered_len(&self) -> usize {
        match &self.suffix {
            Some(suffix) => self.prefix.len() + NONCE_BYTES * 2 + suffix.len(),
            None => self.prefix.len(),
        }
    }

    fn render(&self) -> Result<String> {
        match &self.suffix {
            Some(suffix) => {
                let nonce: [u8; NONCE_BYTES] = SecureRandom::bytes()?;
                Ok(format!("{}{}{}", self.prefix, hex::encode(nonce), suffix))
            }
            None => Ok(self.prefix.clone()),
        }
    }

    fn matches(&self, line: &str) -> bool {
        match &self.suffix {
            Some(suffix) => {
                line.len() >= self.prefix.len() + suffix.len()
                    && line.starts_with(&self.prefix)
                    && line.ends_with(suffix.as_str())
            }
            None => line == self.prefix,
        }
    }
}

/// A validated banner script bound to one role.
#[derive(Debug, Clone)]
pub struct BannerExchange {
    role: Role,
    lines: Vec<Template>,
    max_line_len: usize,
}

impl BannerExchange {
    /// Validate a banner config.
    pub fn new(config: &BannerConfig, role: Role) -> Result<Self> {
        if config.max_line_len == 0 {
            return Err(Error::config("banner max_line_len must be positive"));
        }

        let lines = config
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| Template::parse(i, line, config.max_line_len))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            role,
            lines,
            max_line_len: config.max_line_len,
        })
    }

    /// Send and check every line in order.
    pub async fn perform<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        for (i, template) in self.lines.iter().enumerate() {
            if template.from == self.role {
                let mut line = template.render()?;
                line.push_str("\r\n");
                stream.write_all(line.as_bytes()).await?;
                stream.flush().await?;
                continue;
            }

            let line = self.read_line(stream, i).await?;
            if !template.matches(&line) {
                return Err(Error::mimicry(format!("banner line {} did not match", i)));
            }
        }

        Ok(())
    }

    /// Read one line byte by byte so nothing past the terminator is consumed.
    async fn read_line<S>(&self, stream: &mut S, index: usize) -> Result<String>
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = Vec::with_capacity(64);
        loop {
            let byte = stream.read_u8().await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    Error::mimicry(format!("peer closed during banner line {}", index))
                } else {
                    Error::Network(e)
                }
            })?;

            if byte == b'\n' {
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                break;
            }

            // One byte of slack for a trailing '\r'.
            if buf.len() > self.max_line_len {
                return Err(self.too_long(index));
            }
            buf.push(byte);
        }

        if buf.len() > self.max_line_len {
            return Err(self.too_long(index));
        }

        String::from_utf8(buf)
            .map_err(|_| Error::mimicry(format!("banner line {} is not UTF-8", index)))
    }

    fn too_long(&self, index: usize) -> Error {
        Error::mimicry(format!("banner line {} exceeds {} bytes", index, self.max_line_len))
    }
}
