//! Long-lived client context for one node
//!
//! `ClusterClient` owns the transport, version tracker, file registry,
//! configuration cache, status broadcaster, and lock manager for a process,
//! and is the intended entry point for callers. There is no hidden global
//! state; everything hangs off this one object.

use crate::config::Config;
use crate::config_cache::ConfigCache;
use crate::error::Result;
use crate::lock;
use crate::registry::{ConfigValue, FileRegistry};
use crate::status::{NodeStatus, StatusBroadcaster};
use crate::transport::{
    encode_cluster_log_request, encode_log_append, send_json, ClusterTransport, MessageKind,
    UnixTransport,
};
use crate::types::{ClusterLogEntry, ClusterMembership, GuestList, VersionVector};
use crate::version_tracker::{RefreshOutcome, VersionTracker};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Deserialize)]
struct ClusterLogWire {
    #[serde(default)]
    entries: Vec<ClusterLogEntry>,
}

pub struct ClusterClient {
    config: Config,
    transport: Arc<dyn ClusterTransport>,
    tracker: Arc<VersionTracker>,
    cache: ConfigCache,
    status: StatusBroadcaster,
    locks: lock::LockManager,
}

impl ClusterClient {
    /// Client over the daemon's Unix socket with the default file registry
    pub fn new(config: Config) -> Result<Self> {
        let transport: Arc<dyn ClusterTransport> = Arc::new(UnixTransport::new(
            config.transport.socket_path.clone(),
        ));
        Self::with_transport(config, transport)
    }

    /// Client over a caller-supplied transport (tests use a scripted one)
    pub fn with_transport(config: Config, transport: Arc<dyn ClusterTransport>) -> Result<Self> {
        Self::with_registry(config, transport, FileRegistry::with_defaults()?)
    }

    pub fn with_registry(
        config: Config,
        transport: Arc<dyn ClusterTransport>,
        registry: FileRegistry,
    ) -> Result<Self> {
        let tracker = Arc::new(VersionTracker::new(transport.clone()));
        let cache = ConfigCache::new(
            transport.clone(),
            tracker.clone(),
            Arc::new(registry),
            config.store.mount_point.clone(),
        );
        let status = StatusBroadcaster::new(transport.clone(), tracker.clone());
        let locks = lock::LockManager::new(
            tracker.clone(),
            config.store.mount_point.clone(),
            config.store.lock_dir.clone(),
            config.lock.execution_timeout(),
            config.lock.poll_interval(),
        );
        Ok(Self {
            config,
            transport,
            tracker,
            cache,
            status,
            locks,
        })
    }

    /// Refresh the version vector; on a daemon generation change, drop all
    /// locally cached parses and status records as well.
    pub async fn refresh(&self) -> RefreshOutcome {
        let outcome = self.tracker.refresh().await;
        if outcome.generation_changed {
            self.cache.clear().await;
            self.status.clear().await;
        }
        outcome
    }

    pub async fn versions(&self) -> VersionVector {
        self.tracker.current().await
    }

    pub async fn membership(&self) -> ClusterMembership {
        self.tracker.membership().await
    }

    pub async fn guest_list(&self) -> GuestList {
        self.tracker.guest_list().await
    }

    /// Current quorum state, read from the store's permission-bit signal
    pub fn quorate(&self) -> bool {
        lock::quorate(&self.config.store.mount_point)
    }

    pub async fn read_config(&self, name: &str) -> Result<ConfigValue> {
        self.cache.read(name).await
    }

    pub async fn write_config(&self, name: &str, value: &ConfigValue) -> Result<()> {
        self.cache.write(name, value).await
    }

    /// Run `section` under the named cluster-wide lock with the configured
    /// default acquisition timeout.
    pub async fn with_lock<T, F, Fut>(&self, lock_id: &str, section: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.with_lock_timeout(lock_id, self.config.lock.acquire_timeout(), section)
            .await
    }

    pub async fn with_lock_timeout<T, F, Fut>(
        &self,
        lock_id: &str,
        acquire_timeout: Duration,
        section: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.locks.with_lock(lock_id, acquire_timeout, section).await
    }

    pub async fn publish_status<T: Serialize>(&self, key: &str, data: &T) {
        self.status.publish(key, data).await
    }

    pub async fn fetch_status(&self, key: &str, node_filter: Option<&str>) -> Vec<NodeStatus> {
        self.status.fetch(key, node_filter).await
    }

    /// Append one entry to the cluster-wide log ring. Best effort, like
    /// status publication.
    pub async fn broadcast_log(&self, priority: u8, ident: &str, tag: &str, message: &str) {
        let payload = encode_log_append(priority, ident, tag, message);
        if let Err(e) = self.transport.send(MessageKind::LogAppend, &payload).await {
            warn!(ident, tag, error = %e, "cluster log append failed");
        }
    }

    /// Fetch up to `max_entries` recent cluster log entries, optionally
    /// filtered to one user.
    pub async fn cluster_log(
        &self,
        max_entries: u32,
        user: Option<&str>,
    ) -> Result<Vec<ClusterLogEntry>> {
        let payload = encode_cluster_log_request(max_entries, user);
        let wire: ClusterLogWire =
            send_json(&*self.transport, MessageKind::GetClusterLog, &payload).await?;
        Ok(wire.entries)
    }
}
