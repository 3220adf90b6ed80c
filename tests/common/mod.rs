#![allow(dead_code)]

use proof_of_device::background::NativeConnection;
use proof_of_device::config::RelayConfig;
use proof_of_device::host::{respond, AttestError, Attestor};
use serde_json::{json, Value};
use std::sync::Arc;
use std::{collections::HashMap, env};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Env guard that restores previous env vars on drop.
pub struct EnvGuard {
    old: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn set(vars: &[(&str, String)]) -> Self {
        let mut old = HashMap::new();
        for (k, v) in vars {
            old.insert((*k).to_string(), env::var(k).ok());
            env::set_var(k, v);
        }
        Self { old }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (k, prev) in self.old.drain() {
            match prev {
                Some(v) => env::set_var(k, v),
                None => env::remove_var(k),
            }
        }
    }
}

/// Create a temp sandbox and point every manifest location template into it.
pub fn sandbox_env() -> (TempDir, EnvGuard) {
    let td = TempDir::new().expect("tempdir");
    let root = td.path().to_path_buf();

    let home = root.join("home");
    let appdata = root.join("appdata_roaming");
    let localappdata = root.join("appdata_local");
    let programdata = root.join("programdata");

    for dir in [&home, &appdata, &localappdata, &programdata] {
        std::fs::create_dir_all(dir).unwrap();
    }

    let guard = EnvGuard::set(&[
        ("HOME", home.to_string_lossy().to_string()),
        ("APPDATA", appdata.to_string_lossy().to_string()),
        ("LOCALAPPDATA", localappdata.to_string_lossy().to_string()),
        ("PROGRAMDATA", programdata.to_string_lossy().to_string()),
    ]);

    (td, guard)
}

/// Deterministic stand-in for the enclave.
pub struct FakeAttestor;

impl Attestor for FakeAttestor {
    fn quote(&self, spid: &str) -> Result<Value, AttestError> {
        Ok(json!(format!("quote-for-{spid}")))
    }

    fn sign(&self, challenge: &Value) -> Result<Value, AttestError> {
        Ok(json!(format!("signed:{challenge}")))
    }
}

pub struct BrokenAttestor;

impl Attestor for BrokenAttestor {
    fn quote(&self, _spid: &str) -> Result<Value, AttestError> {
        Err("enclave not loaded".into())
    }

    fn sign(&self, _challenge: &Value) -> Result<Value, AttestError> {
        Err("sealed key missing".into())
    }
}

pub fn test_config() -> RelayConfig {
    RelayConfig {
        spid: "0123456789ABCDEF".to_string(),
        ..RelayConfig::default()
    }
}

/// The native-host end of an in-process channel.
pub struct NativeStub {
    /// Messages the relay posted to the host.
    pub outbound: mpsc::UnboundedReceiver<Value>,
    /// Messages from the host to the relay. Dropping it disconnects.
    pub inbound: mpsc::Sender<Value>,
}

pub fn native_stub() -> (NativeConnection<mpsc::UnboundedSender<Value>>, NativeStub) {
    let (port, outbound) = mpsc::unbounded_channel();
    let (inbound, incoming) = mpsc::channel(16);
    (
        NativeConnection { port, incoming },
        NativeStub { outbound, inbound },
    )
}

/// Answer every outbound message with the real host dispatch code.
pub fn spawn_host<A>(mut stub: NativeStub, attestor: A, config: Arc<RelayConfig>) -> JoinHandle<()>
where
    A: Attestor + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(message) = stub.outbound.recv().await {
            if let Some(reply) = respond(&attestor, &config, &message.to_string()) {
                if stub.inbound.send(reply).await.is_err() {
                    break;
                }
            }
        }
    })
}
