//! Relay constants shared by the page, the extension and the native host.
//!
//! All three sides must agree on these values or messages are silently dropped.
//! The defaults mirror the demo deployment (`http://localhost:3000`).

use crate::error::RelayError;
use crate::protocol::RequestKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_HOST: &str = "POD_EXT";
pub const DEFAULT_REMOTE: &str = "POD_BROWSER";
pub const DEFAULT_REGISTER: &str = "get_quote";
pub const DEFAULT_CHALLENGE: &str = "sign_challenge";
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 30_000;

/// How the background relay treats a request that arrives while another one
/// is still waiting on the native host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// Queue it and forward once the current reply has been dispatched.
    #[default]
    Serialize,
    /// Forward it immediately and take over the correlator slot. The displaced
    /// caller is failed with [`RelayError::Superseded`].
    Preempt,
}

/// Where the content relay posts replies back to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyTarget {
    /// Only the configured trusted origin may receive the reply.
    #[default]
    Origin,
    /// `"*"`: any frame holding a reference to the source can observe it.
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Trusted page origin, compared with exact string equality.
    pub origin: String,
    /// Identifier this extension stamps on replies to the page.
    pub host: String,
    /// Identifier the page stamps on its requests.
    pub remote: String,
    /// Wire token for [`RequestKind::Register`].
    pub register: String,
    /// Wire token for [`RequestKind::Challenge`].
    pub challenge: String,
    /// Service provider id sent with every registration.
    pub spid: String,
    pub policy: ConcurrencyPolicy,
    pub reply_target: ReplyTarget,
    /// How long the background relay waits on one native reply before failing
    /// the caller and moving on to the next request. `0` waits forever.
    pub reply_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            host: DEFAULT_HOST.to_string(),
            remote: DEFAULT_REMOTE.to_string(),
            register: DEFAULT_REGISTER.to_string(),
            challenge: DEFAULT_CHALLENGE.to_string(),
            spid: String::new(),
            policy: ConcurrencyPolicy::default(),
            reply_target: ReplyTarget::default(),
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT_MS,
        }
    }
}

impl RelayConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    ///
    /// ```
    /// use proof_of_device::config::{ConcurrencyPolicy, RelayConfig};
    ///
    /// let cfg = RelayConfig::from_toml_str(r#"
    ///     spid = "ABCDEF0123456789"
    ///     policy = "preempt"
    /// "#).unwrap();
    /// assert_eq!(cfg.spid, "ABCDEF0123456789");
    /// assert_eq!(cfg.policy, ConcurrencyPolicy::Preempt);
    /// assert_eq!(cfg.register, "get_quote");
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self, RelayError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn token(&self, kind: RequestKind) -> &str {
        match kind {
            RequestKind::Register => &self.register,
            RequestKind::Challenge => &self.challenge,
        }
    }

    /// Case-sensitive reverse lookup of a wire token.
    pub fn kind_for_token(&self, token: &str) -> Option<RequestKind> {
        if token == self.register {
            Some(RequestKind::Register)
        } else if token == self.challenge {
            Some(RequestKind::Challenge)
        } else {
            None
        }
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        (self.reply_timeout_ms > 0).then(|| Duration::from_millis(self.reply_timeout_ms))
    }

    /// The `targetOrigin` argument used when replying to the page.
    pub fn reply_origin(&self) -> &str {
        match self.reply_target {
            ReplyTarget::Origin => &self.origin,
            ReplyTarget::Wildcard => "*",
        }
    }
}
