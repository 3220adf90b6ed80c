//! Native host side of the channel: framing, stdio helpers and the request loop
//! that hands REGISTER/CHALLENGE messages to an [`Attestor`].
//!
//! Never log to stdout from a host. Stdout carries framed protocol messages.

use crate::config::RelayConfig;
use crate::protocol::{RequestKind, ERROR_FIELD, MSG_FIELD};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::{debug, warn};

pub const MAX_TO_BROWSER: usize = 1_048_576; // 1 MB (host -> browser)
pub const MAX_FROM_BROWSER: usize = 64 * 1_048_576; // 64 MB (browser -> host)

#[derive(Debug, Error)]
pub enum NmError {
    /// The peer closed the pipe at a frame boundary. Normal shutdown.
    #[error("native messaging peer disconnected")]
    Disconnected,

    #[error("message of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },

    #[error("message is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[inline]
fn read_exact_u32_len<R: Read>(r: &mut R) -> Result<u32, NmError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => NmError::Disconnected,
        _ => NmError::Io(e),
    })?;
    Ok(u32::from_ne_bytes(len_buf))
}

/// Encode any serde-serializable value into a frame of at most `max` JSON bytes:
/// 4-byte native-endian length + JSON bytes.
pub fn encode_frame<T: Serialize>(msg: &T, max: usize) -> Result<Vec<u8>, NmError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > max {
        return Err(NmError::TooLarge {
            len: json.len(),
            max,
        });
    }
    let mut out = Vec::with_capacity(4 + json.len());
    out.extend_from_slice(&(json.len() as u32).to_ne_bytes());
    out.extend_from_slice(&json);
    Ok(out)
}

/// Encode a host -> browser frame (1 MiB cap).
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, NmError> {
    encode_frame(msg, MAX_TO_BROWSER)
}

/// Decode a single framed message from a reader.
pub fn decode_message<R: Read>(reader: &mut R, max_size: usize) -> Result<String, NmError> {
    let len = read_exact_u32_len(&mut *reader)? as usize;
    let cap = max_size.min(MAX_FROM_BROWSER);
    if len > cap {
        return Err(NmError::TooLarge { len, max: cap });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

/// Read one message from stdin.
#[cfg(feature = "tokio")]
pub async fn get_message() -> Result<String, NmError> {
    tokio::task::spawn_blocking(move || {
        let mut stdin = io::stdin();
        decode_message(&mut stdin, MAX_FROM_BROWSER)
    })
    .await
    .map_err(|e| NmError::Io(io::Error::new(io::ErrorKind::Other, e)))?
}

/// Write one message to stdout and flush.
#[cfg(feature = "tokio")]
pub async fn send_message<T: Serialize>(msg: &T) -> Result<(), NmError> {
    let frame = encode_message(msg)?;
    tokio::task::spawn_blocking(move || {
        let mut stdout = io::stdout();
        stdout.write_all(&frame)?;
        stdout.flush()?;
        Ok(())
    })
    .await
    .map_err(|e| NmError::Io(io::Error::new(io::ErrorKind::Other, e)))?
}

/// Read stdin until the browser disconnects, feeding each message to `handler`.
///
/// Returns `Ok(())` on disconnect.
#[cfg(feature = "tokio")]
pub async fn event_loop<F, Fut>(mut handler: F) -> Result<(), NmError>
where
    F: FnMut(String) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<(), NmError>> + Send + 'static,
{
    loop {
        let msg = match get_message().await {
            Ok(msg) => msg,
            Err(NmError::Disconnected) => return Ok(()),
            Err(e) => return Err(e),
        };
        handler(msg).await?;
    }
}

pub type AttestError = Box<dyn std::error::Error + Send + Sync>;

/// The hardware-backed signer behind the native host.
pub trait Attestor {
    /// Produce an attestation quote bound to the service provider id.
    fn quote(&self, spid: &str) -> Result<Value, AttestError>;

    /// Sign an opaque server challenge with the device key.
    fn sign(&self, challenge: &Value) -> Result<Value, AttestError>;
}

/// Handle one raw inbound message and build the reply, if any.
///
/// Attestor failures are answered with `{msg, error}` so the caller is not left
/// waiting. Messages that cannot be attributed to a kind get no reply.
pub fn respond<A: Attestor + ?Sized>(attestor: &A, config: &RelayConfig, raw: &str) -> Option<Value> {
    let message: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "dropping malformed native message");
            return None;
        }
    };
    let token = message.get(MSG_FIELD).and_then(Value::as_str)?;
    let Some(kind) = config.kind_for_token(token) else {
        warn!(token, "dropping native message with unknown token");
        return None;
    };
    debug!(?kind, "native request");

    let result = match kind {
        RequestKind::Register => {
            let spid = message
                .get(kind.outbound_field())
                .and_then(Value::as_str)
                .unwrap_or_default();
            attestor.quote(spid)
        }
        RequestKind::Challenge => {
            let challenge = message.get(kind.outbound_field()).unwrap_or(&Value::Null);
            attestor.sign(challenge)
        }
    };

    let mut reply = Map::new();
    reply.insert(MSG_FIELD.into(), Value::String(token.to_string()));
    match result {
        Ok(payload) => {
            reply.insert(kind.reply_field().into(), payload);
        }
        Err(e) => {
            warn!(?kind, error = %e, "attestor failed");
            reply.insert(ERROR_FIELD.into(), Value::String(e.to_string()));
        }
    }
    Some(Value::Object(reply))
}

/// Blocking request loop over any reader/writer pair.
///
/// Zero-length frames are skipped. Returns `Ok(())` when the reader hits EOF.
pub fn serve<A, R, W>(attestor: &A, config: &RelayConfig, reader: &mut R, writer: &mut W) -> Result<(), NmError>
where
    A: Attestor + ?Sized,
    R: Read,
    W: Write,
{
    loop {
        let raw = match decode_message(&mut *reader, MAX_FROM_BROWSER) {
            Ok(raw) => raw,
            Err(NmError::Disconnected) => {
                debug!("browser closed the channel");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if raw.is_empty() {
            continue;
        }
        if let Some(reply) = respond(attestor, config, &raw) {
            writer.write_all(&encode_message(&reply)?)?;
            writer.flush()?;
        }
    }
}

/// [`serve`] over the process's stdin/stdout, for host executables.
#[cfg(feature = "tokio")]
pub async fn serve_stdio<A>(attestor: std::sync::Arc<A>, config: std::sync::Arc<RelayConfig>) -> Result<(), NmError>
where
    A: Attestor + Send + Sync + 'static,
{
    event_loop(move |raw| {
        let attestor = attestor.clone();
        let config = config.clone();
        async move {
            if raw.is_empty() {
                return Ok(());
            }
            match respond(attestor.as_ref(), &config, &raw) {
                Some(reply) => send_message(&reply).await,
                None => Ok(()),
            }
        }
    })
    .await
}

/// Base64 for byte blobs (quotes, signatures) carried as JSON strings.
pub fn encode_blob(blob: impl AsRef<[u8]>) -> String {
    STANDARD.encode(blob)
}

pub fn decode_blob(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}
