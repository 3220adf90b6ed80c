//! Launching a native host process and talking to it over its stdio, the way
//! the browser does for `runtime.connectNative`.

use crate::background::{NativeConnection, NativePort};
use crate::error::RelayError;
use crate::host::{decode_message, encode_frame, NmError, MAX_FROM_BROWSER, MAX_TO_BROWSER};
use serde_json::Value;
use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Inbound messages buffered before the relay drains them.
const INCOMING_CAPACITY: usize = 32;

/// Outbound half of a child-process native channel.
pub struct ChildPort {
    frames: mpsc::UnboundedSender<Vec<u8>>,
    child: Mutex<Child>,
}

impl NativePort for ChildPort {
    fn post_message(&self, message: &Value) -> Result<(), RelayError> {
        let frame = encode_frame(message, MAX_FROM_BROWSER)?;
        self.frames.send(frame).map_err(|_| RelayError::Disconnected)
    }
}

impl Drop for ChildPort {
    fn drop(&mut self) {
        if let Ok(child) = self.child.get_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Spawn `program` and wire its stdin/stdout as a native channel.
///
/// Must be called from within a Tokio runtime. Stderr is inherited so host logs
/// stay visible.
pub fn connect_native<I, S>(program: impl AsRef<Path>, args: I) -> Result<NativeConnection<ChildPort>, RelayError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(program.as_ref())
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()?;
    let (Some(mut stdin), Some(mut stdout)) = (child.stdin.take(), child.stdout.take()) else {
        let _ = child.kill();
        return Err(RelayError::NativeHostUnavailable);
    };
    debug!(program = %program.as_ref().display(), pid = child.id(), "native host started");

    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    tokio::task::spawn_blocking(move || {
        while let Some(frame) = frames_rx.blocking_recv() {
            if let Err(e) = stdin.write_all(&frame).and_then(|_| stdin.flush()) {
                warn!(error = %e, "native host stdin closed");
                break;
            }
        }
    });

    let (incoming_tx, incoming) = mpsc::channel(INCOMING_CAPACITY);
    tokio::task::spawn_blocking(move || loop {
        let message = decode_message(&mut stdout, MAX_TO_BROWSER)
            .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(NmError::from));
        match message {
            Ok(message) => {
                if incoming_tx.blocking_send(message).is_err() {
                    break;
                }
            }
            Err(NmError::Disconnected) => {
                debug!("native host closed stdout");
                break;
            }
            Err(e @ (NmError::Json(_) | NmError::InvalidUtf8(_))) => {
                warn!(error = %e, "skipping undecodable native message");
            }
            Err(e) => {
                warn!(error = %e, "native channel failed");
                break;
            }
        }
    });

    Ok(NativeConnection {
        port: ChildPort {
            frames: frames_tx,
            child: Mutex::new(child),
        },
        incoming,
    })
}

/// Resolve an installed host manifest and launch the host it names.
///
/// Chromium-family browsers pass the caller origin as the first argument; the
/// same is done here when `caller_origin` is given.
#[cfg(feature = "install")]
pub fn connect_installed(
    name: &str,
    browser: &str,
    scope: crate::install::Scope,
    caller_origin: Option<&str>,
) -> Result<NativeConnection<ChildPort>, RelayError> {
    let manifest = crate::install::read_manifest(name, browser, scope)?;
    connect_native(&manifest.path, caller_origin)
}
