//! Shared fixtures for integration tests

use async_trait::async_trait;
use quorumfs_core::config::{Config, LockConfig, StoreConfig, TransportConfig};
use quorumfs_core::error::{QuorumFsError, Result};
use quorumfs_core::transport::{ClusterTransport, MessageKind};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, Once};

static TRACING: Once = Once::new();

/// Route test logs through tracing, honoring `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

type Handler = Box<dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync>;

/// Scripted transport for driving the client without a daemon
#[derive(Default)]
pub struct TestTransport {
    handlers: Mutex<HashMap<MessageKind, Handler>>,
    calls: Mutex<HashMap<MessageKind, u64>>,
}

impl TestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: MessageKind, handler: F)
    where
        F: Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.handlers.lock().unwrap().insert(kind, Box::new(handler));
    }

    pub fn respond_json(&self, kind: MessageKind, value: serde_json::Value) {
        let body = serde_json::to_vec(&value).unwrap();
        self.on(kind, move |_| Ok(body.clone()));
    }

    pub fn calls(&self, kind: MessageKind) -> u64 {
        self.calls.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }

    /// Script a healthy single-generation cluster of two nodes
    pub fn script_cluster(&self, start_time: u64) {
        self.respond_json(
            MessageKind::GetVersionVector,
            json!({
                "starttime": start_time,
                "configs": {"datacenter.cfg": 1},
                "membership": 1,
                "guests": 1,
                "kv": {},
            }),
        );
        self.respond_json(
            MessageKind::GetMembership,
            json!({"nodes": [
                {"name": "alpha", "ip": "10.0.0.1", "nodeid": 1, "votes": 1, "online": true},
                {"name": "beta", "ip": "10.0.0.2", "nodeid": 2, "votes": 1, "online": true},
            ]}),
        );
        self.respond_json(MessageKind::GetGuestList, json!({"guests": []}));
    }

    /// Serve `GetConfig` from files under the given mount point
    pub fn serve_configs_from(&self, mount_point: &Path) {
        let mount = mount_point.to_path_buf();
        self.on(MessageKind::GetConfig, move |payload| {
            let path = std::str::from_utf8(&payload[..payload.len() - 1]).unwrap();
            match std::fs::read(mount.join(path)) {
                Ok(bytes) => Ok(bytes),
                Err(_) => Err(QuorumFsError::DaemonError { errno: 2 }),
            }
        });
    }
}

#[async_trait]
impl ClusterTransport for TestTransport {
    async fn send(&self, kind: MessageKind, payload: &[u8]) -> Result<Vec<u8>> {
        *self.calls.lock().unwrap().entry(kind).or_insert(0) += 1;
        let handlers = self.handlers.lock().unwrap();
        match handlers.get(&kind) {
            Some(handler) => handler(payload),
            None => Err(QuorumFsError::ChannelUnavailable {
                details: format!("no handler for {:?}", kind),
            }),
        }
    }
}

/// Config pointing at a temporary mount point, with test-friendly timings
pub fn test_config(mount_point: &Path) -> Config {
    Config {
        transport: TransportConfig {
            socket_path: mount_point.join("daemon.sock"),
        },
        store: StoreConfig {
            mount_point: mount_point.to_path_buf(),
            lock_dir: mount_point.join("priv/lock"),
        },
        lock: LockConfig {
            acquire_timeout_ms: 2_000,
            execution_timeout_ms: 60_000,
            poll_interval_ms: 10,
        },
    }
}
