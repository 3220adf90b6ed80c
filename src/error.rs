use crate::host::NmError;
use crate::protocol::RequestKind;
use thiserror::Error;

/// Errors surfaced by the relays.
///
/// None of these reach the page: the content relay logs them and drops the
/// reply, so a failed round trip looks like silence from the page's side.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The native host could not be reached when the background relay started.
    #[error("native host unavailable")]
    NativeHostUnavailable,

    /// The native channel closed while a request was in flight.
    #[error("native host disconnected")]
    Disconnected,

    /// A newer request took the correlator slot (preempt policy).
    #[error("{0:?} request superseded by a newer request")]
    Superseded(RequestKind),

    /// The native host answered with an `error` field.
    #[error("native host reported: {0}")]
    NativeHost(String),

    /// The reply did not match the expected shape or kind.
    #[error("unexpected native reply: {0}")]
    UnexpectedReply(String),

    /// The native host did not answer before the reply deadline.
    #[error("{0:?} request got no native reply in time")]
    ReplyTimeout(RequestKind),

    #[error("invalid relay config: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Framing(#[from] NmError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
