//! The page's browsing context as seen by the page and the content relay.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

/// A browsing context that can receive `postMessage` calls and run scripts.
pub trait PageWindow: Send + Sync {
    fn origin(&self) -> String;

    /// `window.postMessage(message, target_origin)` on this window. The
    /// resulting event's source is the window itself.
    fn post_message(&self, message: Value, target_origin: &str);

    /// Insert an inline script, let it run, and remove the element again.
    fn inject_script(&self, source: &str);
}

/// A `message` event as delivered to window listeners.
#[derive(Clone)]
pub struct WindowEvent {
    pub origin: String,
    pub source: Option<Arc<dyn PageWindow>>,
    pub data: Value,
}

impl fmt::Debug for WindowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowEvent")
            .field("origin", &self.origin)
            .field("has_source", &self.source.is_some())
            .field("data", &self.data)
            .finish()
    }
}

/// Object identity, ignoring vtable pointers.
pub fn same_window(a: &Arc<dyn PageWindow>, b: &Arc<dyn PageWindow>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// In-process window: listeners subscribe to a channel of events.
pub struct LocalWindow {
    origin: String,
    this: Weak<LocalWindow>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<WindowEvent>>>,
    globals: Mutex<HashMap<String, Value>>,
    scripts_run: Mutex<usize>,
}

impl LocalWindow {
    pub fn new(origin: impl Into<String>) -> Arc<Self> {
        let origin = origin.into();
        Arc::new_cyclic(|this| Self {
            origin,
            this: this.clone(),
            listeners: Mutex::new(Vec::new()),
            globals: Mutex::new(HashMap::new()),
            scripts_run: Mutex::new(0),
        })
    }

    /// `window.addEventListener("message", ...)`.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<WindowEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(tx);
        }
        rx
    }

    /// Dispatch an arbitrary event, e.g. one posted by another frame.
    pub fn deliver(&self, event: WindowEvent) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.lock().ok()?.get(name).cloned()
    }

    /// Number of injected scripts that have run. Script elements never stay in
    /// the document, so this is the only trace left behind.
    pub fn scripts_run(&self) -> usize {
        self.scripts_run.lock().map(|n| *n).unwrap_or(0)
    }

    fn as_dyn(&self) -> Option<Arc<dyn PageWindow>> {
        self.this.upgrade().map(|w| w as Arc<dyn PageWindow>)
    }
}

impl PageWindow for LocalWindow {
    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn post_message(&self, message: Value, target_origin: &str) {
        // The browser silently discards messages whose target origin does not match.
        if target_origin != "*" && target_origin != self.origin {
            return;
        }
        self.deliver(WindowEvent {
            origin: self.origin.clone(),
            source: self.as_dyn(),
            data: message,
        });
    }

    /// Runs statements of the form `window.NAME = <json>;`. Anything else is
    /// ignored.
    fn inject_script(&self, source: &str) {
        if let Ok(mut n) = self.scripts_run.lock() {
            *n += 1;
        }
        for stmt in source.split(';') {
            let Some((lhs, rhs)) = stmt.split_once('=') else {
                continue;
            };
            let Some(name) = lhs.trim().strip_prefix("window.") else {
                continue;
            };
            if let Ok(value) = serde_json::from_str::<Value>(rhs.trim()) {
                if let Ok(mut globals) = self.globals.lock() {
                    globals.insert(name.to_string(), value);
                }
            }
        }
    }
}
