use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tiny_http::Server;

/// Stop handle for one running host thread. Dropping it stops the host.
pub struct HttpHostControl {
    server: Arc<Server>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HttpHostControl {
    pub fn new(server: Arc<Server>, running: Arc<AtomicBool>, thread: JoinHandle<()>) -> Self {
        Self {
            server,
            running,
            thread: Some(thread),
        }
    }

    /// Flags the accept loop, wakes it and waits for the thread to finish.
    pub fn shutdown(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.server.unblock();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for HttpHostControl {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Hosts started from one context, keyed by the id handed out in their handle.
#[derive(Default)]
pub struct HttpHostManager {
    issued: u64,
    hosts: BTreeMap<String, HttpHostControl>,
}

impl HttpHostManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, control: HttpHostControl) -> Value {
        self.issued += 1;
        let id = format!("http-host-{}", self.issued);
        self.hosts.insert(id.clone(), control);
        json!({ "id": id, "type": super::CONTRACT_HTTP_HOST })
    }

    /// Accepts the handle object returned at start or its bare id.
    pub fn stop(&mut self, handle: &Value) -> Result<Value> {
        let id = match handle {
            Value::String(id) => id.as_str(),
            Value::Object(map) => map
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("HTTP host handle missing id"))?,
            _ => return Err(anyhow!("Invalid HTTP host handle")),
        };
        let mut control = self
            .hosts
            .remove(id)
            .ok_or_else(|| anyhow!("Unknown HTTP host handle: {id}"))?;
        control.shutdown();
        Ok(json!({ "stopped": true, "id": id }))
    }

    pub fn stop_all(&mut self) {
        for (_, mut control) in std::mem::take(&mut self.hosts) {
            control.shutdown();
        }
    }

    pub fn running(&self) -> usize {
        self.hosts.values().filter(|control| control.is_running()).count()
    }
}
