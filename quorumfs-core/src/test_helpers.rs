//! Test helpers for unit and integration tests
//!
//! `MockTransport` scripts per-message-kind responses and records call
//! counts, so tests can drive the version tracker, caches, and lock manager
//! without a running daemon.

use crate::error::{QuorumFsError, Result};
use crate::transport::{ClusterTransport, MessageKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

type Handler = Box<dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync>;

/// Scripted in-memory transport. Handlers are installed per message kind
/// and can be replaced mid-test; unscripted kinds report the channel as
/// unavailable.
#[derive(Default)]
pub struct MockTransport {
    handlers: Mutex<HashMap<MessageKind, Handler>>,
    calls: Mutex<HashMap<MessageKind, u64>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the handler for a message kind
    pub fn on<F>(&self, kind: MessageKind, handler: F)
    where
        F: Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.handlers.lock().unwrap().insert(kind, Box::new(handler));
    }

    /// Respond to a kind with a fixed JSON body
    pub fn respond_json(&self, kind: MessageKind, value: serde_json::Value) {
        let body = serde_json::to_vec(&value).unwrap();
        self.on(kind, move |_| Ok(body.clone()));
    }

    /// Respond to a kind with a fixed raw body
    pub fn respond_raw(&self, kind: MessageKind, body: Vec<u8>) {
        self.on(kind, move |_| Ok(body.clone()));
    }

    /// Respond to a kind with a daemon errno
    pub fn respond_error(&self, kind: MessageKind, errno: i32) {
        self.on(kind, move |_| Err(QuorumFsError::DaemonError { errno }));
    }

    /// Number of requests seen for a kind
    pub fn calls(&self, kind: MessageKind) -> u64 {
        self.calls.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ClusterTransport for MockTransport {
    async fn send(&self, kind: MessageKind, payload: &[u8]) -> Result<Vec<u8>> {
        *self.calls.lock().unwrap().entry(kind).or_insert(0) += 1;
        let handlers = self.handlers.lock().unwrap();
        match handlers.get(&kind) {
            Some(handler) => handler(payload),
            None => Err(QuorumFsError::ChannelUnavailable {
                details: format!("no mock handler for {:?}", kind),
            }),
        }
    }
}
