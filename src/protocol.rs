//! Message shapes for every hop of the relay.
//!
//! | Hop | Request | Response |
//! |-----|---------|----------|
//! | page -> content relay | [`PageMessage`] | [`PageReply`] |
//! | content -> background | [`RuntimeRequest`] | [`RuntimeResponse`] |
//! | background -> native host | `{msg, spid}` / `{msg, challenge}` | [`NativeReply`] |
//!
//! The native host protocol carries no request id. Replies are matched to
//! requests purely by ordering, see [`crate::background`].

use crate::config::RelayConfig;
use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names shared by both directions of the native channel.
pub const MSG_FIELD: &str = "msg";
pub const ERROR_FIELD: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Register,
    Challenge,
}

impl RequestKind {
    /// Payload field carried by the outbound native message.
    pub fn outbound_field(self) -> &'static str {
        match self {
            RequestKind::Register => "spid",
            RequestKind::Challenge => "challenge",
        }
    }

    /// Payload field expected on the native host's reply.
    pub fn reply_field(self) -> &'static str {
        match self {
            RequestKind::Register => "quote",
            RequestKind::Challenge => "signed",
        }
    }
}

/// What the page posts with `window.postMessage`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageMessage {
    #[serde(default)]
    pub host: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// What the content relay posts back to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReply {
    pub host: String,
    pub data: String,
}

/// Request on the extension runtime bus, one variant per [`RequestKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeRequest {
    /// `data` is carried from the page but not sent on; the spid comes from config.
    Register { data: Option<Value> },
    Challenge { challenge: Option<Value> },
}

impl RuntimeRequest {
    pub fn from_page(kind: RequestKind, data: Option<Value>) -> Self {
        match kind {
            RequestKind::Register => RuntimeRequest::Register { data },
            RequestKind::Challenge => RuntimeRequest::Challenge { challenge: data },
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            RuntimeRequest::Register { .. } => RequestKind::Register,
            RuntimeRequest::Challenge { .. } => RequestKind::Challenge,
        }
    }

    /// Build the outbound native message, e.g. `{"msg":"get_quote","spid":"..."}`.
    pub fn native_message(&self, config: &RelayConfig) -> Value {
        let kind = self.kind();
        let mut msg = Map::new();
        msg.insert(MSG_FIELD.into(), Value::String(config.token(kind).to_string()));
        let payload = match self {
            RuntimeRequest::Register { .. } => Some(Value::String(config.spid.clone())),
            RuntimeRequest::Challenge { challenge } => challenge.clone(),
        };
        // An absent challenge is omitted, not sent as null.
        if let Some(payload) = payload {
            msg.insert(kind.outbound_field().into(), payload);
        }
        Value::Object(msg)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeResponse {
    pub kind: RequestKind,
    pub response: Value,
}

/// A decoded message from the native host.
#[derive(Debug)]
pub struct NativeReply {
    pub kind: RequestKind,
    /// The `quote`/`signed` payload, or why there is none.
    pub outcome: Result<Value, RelayError>,
}

impl NativeReply {
    /// Fails only when the message cannot be attributed to a kind at all.
    pub fn parse(message: &Value, config: &RelayConfig) -> Result<Self, RelayError> {
        let token = message
            .get(MSG_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::UnexpectedReply("missing msg token".into()))?;
        let kind = config
            .kind_for_token(token)
            .ok_or_else(|| RelayError::UnexpectedReply(format!("unknown token {token:?}")))?;

        let outcome = if let Some(err) = message.get(ERROR_FIELD) {
            Err(RelayError::NativeHost(js_string(err)))
        } else {
            message.get(kind.reply_field()).cloned().ok_or_else(|| {
                RelayError::UnexpectedReply(format!("{token} reply without {}", kind.reply_field()))
            })
        };

        Ok(Self { kind, outcome })
    }
}

/// Render a value the way JavaScript's `String(value)` does.
///
/// ```
/// use proof_of_device::protocol::js_string;
/// use serde_json::json;
///
/// assert_eq!(js_string(&json!("abc")), "abc");
/// assert_eq!(js_string(&json!([1, null, "x"])), "1,,x");
/// assert_eq!(js_string(&json!({"a": 1})), "[object Object]");
/// assert_eq!(js_string(&json!(1.0)), "1");
/// ```
pub fn js_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !(n.is_i64() || n.is_u64()) => js_number(f),
            _ => n.to_string(),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => js_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// `Number.prototype.toString()`: shortest round-trip digits, exponent form
/// outside `[1e-6, 1e21)`.
fn js_number(f: f64) -> String {
    if f == 0.0 {
        return "0".to_string();
    }
    if (1e-6..1e21).contains(&f.abs()) {
        return f.to_string();
    }
    let exp = format!("{f:e}");
    match exp.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
        _ => exp,
    }
}
