//! # proof_of_device
//!
//! Proof-of-device authentication relays a server challenge from a web page to a
//! native host that signs it with a hardware-backed key. The message path is:
//!
//! ```text
//! page --window message--> content relay --runtime message--> background relay
//!   ^                                                               |
//!   |                                                         native message
//!   +--------------------------- ... <--------------------- native host
//! ```
//!
//! ---
//!
//! ## Crate layout
//!
//! - [`config`]: the constants all three sides must agree on (`origin`, `host`,
//!   `remote`, operation tokens, `spid`), loadable from TOML.
//! - [`protocol`]: typed messages for every hop.
//! - [`window`]: the page's browsing context (`postMessage`, script injection).
//! - [`page`]: page-side client issuing REGISTER/CHALLENGE.
//! - [`content`]: the origin/host/source-gated bridge to the runtime bus.
//! - [`background`]: the native channel owner and its one-in-flight correlator.
//! - [`native`]: spawning a native host process as the browser does.
//! - [`host`]: native host framing, stdio helpers and request loop.
//! - [`install`]: host manifest install/verify/remove.
//!
//! ---
//!
//! ## Native messaging wire protocol
//!
//! 1. The sender writes a **4-byte length prefix** (`u32`) in **native endianness**.
//! 2. Then writes **that many bytes** of UTF-8 JSON.
//!
//! Host → browser messages are capped at **1 MiB** ([`host::MAX_TO_BROWSER`]);
//! browser → host at **64 MiB** ([`host::MAX_FROM_BROWSER`]).
//!
//! Requests are `{"msg": "get_quote", "spid": ...}` and
//! `{"msg": "sign_challenge", "challenge": ...}`; replies echo `msg` and carry
//! `quote` or `signed` (or `error`). There is no request id: the background
//! relay keeps exactly one request in flight.
//!
//! ---
//!
//! ## Writing a native host
//!
//! **Do not use `println!()`** in a native messaging host. Use [`logging::init`],
//! which writes to stderr.
//!
//! ```no_run
//! use proof_of_device::config::RelayConfig;
//! use proof_of_device::host::{encode_blob, serve_stdio, AttestError, Attestor, NmError};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! struct Enclave;
//!
//! impl Attestor for Enclave {
//!     fn quote(&self, spid: &str) -> Result<Value, AttestError> {
//!         Ok(json!({ "spid": spid, "blob": encode_blob(b"quote") }))
//!     }
//!     fn sign(&self, challenge: &Value) -> Result<Value, AttestError> {
//!         Ok(Value::String(encode_blob(challenge.to_string())))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), NmError> {
//!     proof_of_device::logging::init("info");
//!     serve_stdio(Arc::new(Enclave), Arc::new(RelayConfig::default())).await
//! }
//! ```
//!
//! ## Wiring the relays in one process
//!
//! ```no_run
//! use proof_of_device::background::BackgroundRelay;
//! use proof_of_device::config::RelayConfig;
//! use proof_of_device::content::ContentRelay;
//! use proof_of_device::native::connect_native;
//! use proof_of_device::page::PageClient;
//! use proof_of_device::window::LocalWindow;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = Arc::new(RelayConfig::default());
//! let background = BackgroundRelay::start(
//!     config.clone(),
//!     connect_native("/usr/local/bin/pod-app", std::iter::empty::<&str>()),
//! );
//!
//! let window = LocalWindow::new(config.origin.clone());
//! let events = window.subscribe();
//! let content = ContentRelay::attach(config.clone(), window.clone(), background);
//! content.listen(events);
//!
//! let page = PageClient::new(config, window);
//! assert!(page.extension_present());
//! page.request_register();
//! # }
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod protocol;

#[cfg(feature = "tokio")]
pub mod background;
#[cfg(feature = "tokio")]
pub mod content;
#[cfg(feature = "tokio")]
pub mod native;
#[cfg(feature = "tokio")]
pub mod page;
#[cfg(feature = "tokio")]
pub mod window;

#[cfg(feature = "install")]
pub mod install;

// -------- Re-exports --------

#[doc(inline)]
pub use config::RelayConfig;
#[doc(inline)]
pub use error::RelayError;
#[doc(inline)]
pub use host::{decode_message, encode_message, NmError};
#[doc(inline)]
pub use protocol::{RequestKind, RuntimeRequest, RuntimeResponse};

#[cfg(feature = "tokio")]
#[doc(inline)]
pub use background::BackgroundRelay;
#[cfg(feature = "tokio")]
#[doc(inline)]
pub use content::ContentRelay;

#[cfg(feature = "install")]
#[doc(inline)]
pub use install::{install, remove, verify_installed, Scope};
