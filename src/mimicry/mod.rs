//! Pre-handshake protocol mimicry.
//!
//! A mimicry strategy runs once per connection, over the raw stream, before
//! the key frame is sent. It makes the first bytes of a connection look like
//! some other, innocuous protocol.
//!
//! The set of strategies is closed: [`Mimicry`] is an enum and adding one
//! means adding a variant. Configuration picks a strategy by `selector`:
//!
//! ```toml
//! [mimicry]
//! selector = "banner"
//!
//! [mimicry.banner]
//! lines = [
//!     { from = "server", text = "220 mail.example.com ESMTP ready" },
//!     { from = "client", text = "EHLO {nonce}.example.org" },
//! ]
//! ```
//!
//! A missing config, an unknown selector, or a missing or empty nested
//! config all mean "no mimicry". Only a nested config that is present but
//! malformed is an error.

mod banner;
mod script;

pub use banner::{BannerConfig, BannerExchange, BannerLine};
pub use script::{ScriptConfig, ScriptExchange, ScriptStep};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Which end of the connection is performing an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The dialing side
    Client,
    /// The accepting side
    Server,
}

/// Known strategy tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimicryKind {
    /// Exact byte script
    Script,
    /// Line-oriented text banners
    Banner,
}

impl MimicryKind {
    /// Look up a selector tag. Unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "script" => Some(MimicryKind::Script),
            "banner" => Some(MimicryKind::Banner),
            _ => None,
        }
    }

    /// The selector tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MimicryKind::Script => "script",
            MimicryKind::Banner => "banner",
        }
    }
}

/// Mimicry configuration, shared by client and server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimicryConfig {
    /// Strategy tag: `"script"` or `"banner"`
    pub selector: String,
    /// Settings for the `script` strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptConfig>,
    /// Settings for the `banner` strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<BannerConfig>,
}

/// A configured mimicry strategy bound to one role.
#[derive(Debug, Clone)]
pub enum Mimicry {
    /// Exact byte script
    Script(ScriptExchange),
    /// Line-oriented text banners
    Banner(BannerExchange),
}

impl Mimicry {
    /// Build the strategy selected by `config`.
    ///
    /// Returns `Ok(None)` when mimicry is not configured, and
    /// `Err(Error::Config)` when the selected nested config is malformed.
    pub fn from_config(config: Option<&MimicryConfig>, role: Role) -> Result<Option<Self>> {
        let Some(config) = config else {
            return Ok(None);
        };

        match MimicryKind::from_tag(&config.selector) {
            Some(MimicryKind::Script) => match &config.script {
                Some(script) if !script.is_empty() => {
                    ScriptExchange::new(script, role).map(|s| Some(Mimicry::Script(s)))
                }
                _ => Ok(None),
            },
            Some(MimicryKind::Banner) => match &config.banner {
                Some(banner) if !banner.is_empty() => {
                    BannerExchange::new(banner, role).map(|b| Some(Mimicry::Banner(b)))
                }
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Like [`Mimicry::from_config`], but a malformed config is logged and
    /// treated as "no mimicry".
    pub fn resolve(config: Option<&MimicryConfig>, role: Role) -> Option<Self> {
        match Self::from_config(config, role) {
            Ok(mimicry) => mimicry,
            Err(e) => {
                tracing::warn!("Ignoring mimicry config: {}", e);
                None
            }
        }
    }

    /// Which strategy this is.
    pub fn kind(&self) -> MimicryKind {
        match self {
            Mimicry::Script(_) => MimicryKind::Script,
            Mimicry::Banner(_) => MimicryKind::Banner,
        }
    }

    /// Run the exchange to completion over the raw stream.
    pub async fn perform<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self {
            Mimicry::Script(script) => script.perform(stream).await,
            Mimicry::Banner(banner) => banner.perform(stream).await,
        }
    }
}
