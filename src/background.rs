//! Background relay: owns the single native channel and correlates each
//! runtime request with the native host's reply.
//!
//! The native protocol has no request id, so at most one request is in flight
//! at a time. The relay is a two-state machine:
//!
//! ```text
//! Idle --request--> AwaitingNativeReply --reply--> Idle
//! ```
//!
//! A request that arrives while awaiting is handled per [`ConcurrencyPolicy`].
//! A reply that never comes is bounded by [`RelayConfig::reply_timeout`]: the
//! waiting caller fails with [`RelayError::ReplyTimeout`] and the backlog moves on.

use crate::config::{ConcurrencyPolicy, RelayConfig};
use crate::content::RuntimeChannel;
use crate::error::RelayError;
use crate::protocol::{NativeReply, RequestKind, RuntimeRequest, RuntimeResponse};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Outbound half of the native channel.
pub trait NativePort: Send + Sync + 'static {
    fn post_message(&self, message: &Value) -> Result<(), RelayError>;
}

impl NativePort for mpsc::UnboundedSender<Value> {
    fn post_message(&self, message: &Value) -> Result<(), RelayError> {
        self.send(message.clone()).map_err(|_| RelayError::Disconnected)
    }
}

/// An established duplex channel to a native host.
pub struct NativeConnection<P> {
    pub port: P,
    /// Closed when the native host goes away.
    pub incoming: mpsc::Receiver<Value>,
}

type Responder = oneshot::Sender<Result<RuntimeResponse, RelayError>>;

/// The correlator: the caller waiting on the current native reply.
struct Pending {
    kind: RequestKind,
    responder: Responder,
    deadline: Option<Instant>,
}

struct Queued {
    request: RuntimeRequest,
    responder: Responder,
}

#[derive(Default)]
struct State {
    slot: Option<Pending>,
    backlog: VecDeque<Queued>,
    connected: bool,
}

/// Observable state, mostly for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Unavailable,
    Idle,
    AwaitingNativeReply { queued: usize },
}

pub struct BackgroundRelay<P: NativePort> {
    config: Arc<RelayConfig>,
    port: Option<P>,
    state: Mutex<State>,
    pump: Mutex<Option<JoinHandle<()>>>,
    /// Wakes the pump when the slot gets a new deadline.
    armed: Notify,
}

impl<P: NativePort> BackgroundRelay<P> {
    /// Construct the relay once at startup.
    ///
    /// If `connection` failed, the relay stays unavailable for its whole
    /// lifetime; there is no reconnect. Otherwise the inbound pump is spawned
    /// on the current Tokio runtime.
    pub fn start(config: Arc<RelayConfig>, connection: Result<NativeConnection<P>, RelayError>) -> Arc<Self> {
        match connection {
            Ok(NativeConnection { port, incoming }) => {
                let relay = Arc::new(Self {
                    config,
                    port: Some(port),
                    state: Mutex::new(State {
                        connected: true,
                        ..State::default()
                    }),
                    pump: Mutex::new(None),
                    armed: Notify::new(),
                });
                let handle = tokio::spawn(relay.clone().pump(incoming));
                if let Ok(mut pump) = relay.pump.lock() {
                    *pump = Some(handle);
                }
                info!("background relay connected to native host");
                relay
            }
            Err(e) => {
                error!(error = %e, "native host unreachable; relay disabled");
                Arc::new(Self {
                    config,
                    port: None,
                    state: Mutex::new(State::default()),
                    pump: Mutex::new(None),
                    armed: Notify::new(),
                })
            }
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn state(&self) -> RelayState {
        let state = self.lock();
        if !state.connected {
            RelayState::Unavailable
        } else if state.slot.is_some() {
            RelayState::AwaitingNativeReply {
                queued: state.backlog.len(),
            }
        } else {
            RelayState::Idle
        }
    }

    /// Forward a runtime request and wait for its native reply.
    pub async fn request(&self, request: RuntimeRequest) -> Result<RuntimeResponse, RelayError> {
        let (tx, rx) = oneshot::channel();
        let kind = request.kind();
        self.submit(request, tx)?;
        match rx.await {
            Ok(result) => result,
            // Responder dropped without an answer: the slot was taken over.
            Err(_) => Err(RelayError::Superseded(kind)),
        }
    }

    fn submit(&self, request: RuntimeRequest, responder: Responder) -> Result<(), RelayError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(if self.port.is_none() {
                RelayError::NativeHostUnavailable
            } else {
                RelayError::Disconnected
            });
        }

        if state.slot.is_some() {
            match self.config.policy {
                ConcurrencyPolicy::Serialize => {
                    debug!(kind = ?request.kind(), queued = state.backlog.len() + 1, "native call in flight; queueing");
                    state.backlog.push_back(Queued { request, responder });
                    return Ok(());
                }
                ConcurrencyPolicy::Preempt => {
                    warn!(kind = ?request.kind(), "native call in flight; preempting correlator, the previous caller loses its reply");
                }
            }
        }

        self.forward(&mut state, request, responder);
        Ok(())
    }

    /// Send to the native host and occupy the slot.
    fn forward(&self, state: &mut State, request: RuntimeRequest, responder: Responder) {
        let kind = request.kind();
        let message = request.native_message(&self.config);
        let posted = match &self.port {
            Some(port) => port.post_message(&message),
            None => Err(RelayError::NativeHostUnavailable),
        };
        match posted {
            Ok(()) => {
                debug!(?kind, "forwarded to native host");
                // Replacing an occupied slot drops the old responder.
                state.slot = Some(Pending {
                    kind,
                    responder,
                    deadline: self.config.reply_timeout().map(|t| Instant::now() + t),
                });
                self.armed.notify_one();
            }
            Err(e) => {
                error!(?kind, error = %e, "failed to post to native host");
                let _ = responder.send(Err(e));
            }
        }
    }

    /// Dispatch one message from the native host.
    pub fn on_native_message(&self, message: Value) {
        let reply = match NativeReply::parse(&message, &self.config) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "ignoring native message");
                return;
            }
        };

        let mut state = self.lock();
        let Some(pending) = state.slot.take() else {
            warn!(kind = ?reply.kind, "native reply with no pending request");
            return;
        };

        let result = if reply.kind != pending.kind {
            Err(RelayError::UnexpectedReply(format!(
                "{:?} reply while awaiting {:?}",
                reply.kind, pending.kind
            )))
        } else {
            reply.outcome.map(|response| RuntimeResponse {
                kind: pending.kind,
                response,
            })
        };
        debug!(kind = ?pending.kind, ok = result.is_ok(), "native reply dispatched");
        if pending.responder.send(result).is_err() {
            debug!(kind = ?pending.kind, "caller went away before the reply");
        }
        self.advance(&mut state);
    }

    /// Fail the pending caller if its reply deadline has passed.
    ///
    /// A reply arriving after this is dispatched to whatever holds the slot
    /// by then, the same ordering hazard as preemption.
    fn expire(&self) {
        let mut state = self.lock();
        let overdue = matches!(
            &state.slot,
            Some(Pending { deadline: Some(deadline), .. }) if *deadline <= Instant::now()
        );
        if !overdue {
            return;
        }
        if let Some(pending) = state.slot.take() {
            warn!(kind = ?pending.kind, queued = state.backlog.len(), "native reply overdue; failing caller");
            let _ = pending.responder.send(Err(RelayError::ReplyTimeout(pending.kind)));
        }
        self.advance(&mut state);
    }

    /// Forward queued requests until one occupies the slot.
    fn advance(&self, state: &mut State) {
        while state.slot.is_none() {
            let Some(next) = state.backlog.pop_front() else {
                break;
            };
            self.forward(state, next.request, next.responder);
        }
    }

    /// The native channel closed: fail everything waiting on it.
    pub fn on_disconnect(&self) {
        let mut state = self.lock();
        if !state.connected {
            return;
        }
        state.connected = false;
        let failed = state.slot.is_some() as usize + state.backlog.len();
        if let Some(pending) = state.slot.take() {
            let _ = pending.responder.send(Err(RelayError::Disconnected));
        }
        for queued in state.backlog.drain(..) {
            let _ = queued.responder.send(Err(RelayError::Disconnected));
        }
        warn!(failed, "native host disconnected");
    }

    /// Stop the inbound pump and fail outstanding callers.
    pub fn shutdown(&self) {
        if let Ok(mut pump) = self.pump.lock() {
            if let Some(handle) = pump.take() {
                handle.abort();
            }
        }
        self.on_disconnect();
    }

    async fn pump(self: Arc<Self>, mut incoming: mpsc::Receiver<Value>) {
        loop {
            let deadline = self.lock().slot.as_ref().and_then(|pending| pending.deadline);
            tokio::select! {
                message = incoming.recv() => match message {
                    Some(message) => self.on_native_message(message),
                    None => break,
                },
                _ = self.armed.notified() => {}
                _ = elapsed(deadline) => self.expire(),
            }
        }
        self.on_disconnect();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // No invariant spans a panic inside the critical sections above.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<P: NativePort> RuntimeChannel for BackgroundRelay<P> {
    fn send_message(
        &self,
        request: RuntimeRequest,
    ) -> impl std::future::Future<Output = Result<RuntimeResponse, RelayError>> + Send {
        self.request(request)
    }
}
