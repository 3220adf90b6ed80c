//! Page-side client: originates REGISTER/CHALLENGE requests and picks the
//! extension's replies out of the window's message stream.

use crate::config::RelayConfig;
use crate::content::PRESENCE_MARKER;
use crate::protocol::{PageMessage, PageReply, RequestKind};
use crate::window::{LocalWindow, PageWindow, WindowEvent};
use serde_json::Value;
use std::sync::Arc;

pub struct PageClient {
    config: Arc<RelayConfig>,
    window: Arc<LocalWindow>,
}

impl PageClient {
    pub fn new(config: Arc<RelayConfig>, window: Arc<LocalWindow>) -> Self {
        Self { config, window }
    }

    /// Whether a content relay has announced itself on this window.
    pub fn extension_present(&self) -> bool {
        self.window.global(PRESENCE_MARKER) == Some(Value::Bool(true))
    }

    pub fn request_register(&self) {
        self.post(RequestKind::Register, None);
    }

    pub fn request_challenge(&self, challenge: Value) {
        self.post(RequestKind::Challenge, Some(challenge));
    }

    fn post(&self, kind: RequestKind, data: Option<Value>) {
        let message = PageMessage {
            host: self.config.remote.clone(),
            kind: Some(self.config.token(kind).to_string()),
            data,
        };
        // PageMessage holds only strings and JSON values.
        if let Ok(message) = serde_json::to_value(message) {
            self.window.post_message(message, &self.config.origin);
        }
    }

    /// The extension's reply carried by `event`, if it is one.
    pub fn reply_from(&self, event: &WindowEvent) -> Option<PageReply> {
        if event.origin != self.config.origin {
            return None;
        }
        let reply: PageReply = serde_json::from_value(event.data.clone()).ok()?;
        (reply.host == self.config.host).then_some(reply)
    }
}
