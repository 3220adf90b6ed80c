//! Content relay: bridges window messages from the page onto the extension
//! runtime bus and posts the answers back to the page.
//!
//! A window message is acted on only when its origin, its `host` stamp and its
//! source window all match. Anything else is dropped without a trace visible
//! to the sender.

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::protocol::{js_string, PageReply, RuntimeRequest, RuntimeResponse};
use crate::window::{same_window, PageWindow, WindowEvent};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Global the page can check to detect the extension.
pub const PRESENCE_MARKER: &str = "__PROOF_OF_DEVICE__";

/// The extension's internal messaging bus, as seen from the content relay.
pub trait RuntimeChannel {
    /// One request, one response. Never queued on this side.
    fn send_message(
        &self,
        request: RuntimeRequest,
    ) -> impl Future<Output = Result<RuntimeResponse, RelayError>> + Send;
}

/// Why a window message was not acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Origin(String),
    Host,
    Source,
    /// `type` is present but not a string.
    Malformed,
    UnknownKind(String),
}

#[derive(Debug)]
pub enum Outcome {
    Dropped(Rejection),
    /// Accepted, but it carried no `type`.
    Ignored,
    Replied(PageReply),
    /// Logged only; the page never hears about it.
    Failed(RelayError),
}

pub struct ContentRelay<R> {
    config: Arc<RelayConfig>,
    window: Arc<dyn PageWindow>,
    runtime: Arc<R>,
}

impl<R> ContentRelay<R>
where
    R: RuntimeChannel + Send + Sync + 'static,
{
    /// Attach to a page: announce the extension through the presence marker.
    pub fn attach(config: Arc<RelayConfig>, window: Arc<dyn PageWindow>, runtime: Arc<R>) -> Arc<Self> {
        window.inject_script(&format!("window.{PRESENCE_MARKER} = true;"));
        Arc::new(Self {
            config,
            window,
            runtime,
        })
    }

    /// Decide whether `event` is ours and what to forward for it.
    pub fn screen(&self, event: &WindowEvent) -> Result<Option<RuntimeRequest>, Rejection> {
        if event.origin != self.config.origin {
            return Err(Rejection::Origin(event.origin.clone()));
        }
        let host = event.data.get("host").and_then(Value::as_str);
        if host != Some(self.config.remote.as_str()) {
            return Err(Rejection::Host);
        }
        match &event.source {
            Some(source) if same_window(source, &self.window) => {}
            _ => return Err(Rejection::Source),
        }

        let token = match event.data.get("type") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => return Ok(None),
            Some(Value::String(token)) if token.is_empty() => return Ok(None),
            Some(Value::String(token)) => token,
            Some(_) => return Err(Rejection::Malformed),
        };
        let kind = self
            .config
            .kind_for_token(token)
            .ok_or_else(|| Rejection::UnknownKind(token.clone()))?;
        Ok(Some(RuntimeRequest::from_page(kind, event.data.get("data").cloned())))
    }

    /// Run one window message through the relay.
    pub async fn handle(&self, event: WindowEvent) -> Outcome {
        let request = match self.screen(&event) {
            Ok(Some(request)) => request,
            Ok(None) => return Outcome::Ignored,
            Err(rejection) => {
                debug!(?rejection, "dropping window message");
                return Outcome::Dropped(rejection);
            }
        };
        let Some(source) = event.source else {
            return Outcome::Dropped(Rejection::Source);
        };

        debug!(kind = ?request.kind(), "relaying page request");
        match self.runtime.send_message(request).await {
            Ok(RuntimeResponse { response, .. }) => {
                let reply = PageReply {
                    host: self.config.host.clone(),
                    data: js_string(&response),
                };
                match serde_json::to_value(&reply) {
                    Ok(message) => {
                        source.post_message(message, self.config.reply_origin());
                        Outcome::Replied(reply)
                    }
                    Err(e) => Outcome::Failed(e.into()),
                }
            }
            Err(e) => {
                error!(error = %e, "runtime request failed");
                Outcome::Failed(e)
            }
        }
    }

    /// Handle every event from `events`, each as its own task.
    pub fn listen(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<WindowEvent>) -> JoinHandle<()> {
        let relay = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let relay = relay.clone();
                tokio::spawn(async move {
                    relay.handle(event).await;
                });
            }
        })
    }
}
