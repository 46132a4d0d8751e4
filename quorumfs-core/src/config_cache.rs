//! Version-keyed configuration cache
//!
//! The generic read path: resolve a file's governing version through the
//! registry, serve the cached parse while that version (and the daemon
//! generation) still match, refetch and reparse otherwise. Entries never
//! escape by reference; every read returns an independently-owned clone so
//! callers can mutate their snapshot freely.

use crate::error::Result;
use crate::registry::{ConfigValue, FileRegistry};
use crate::transport::{fetch_config, ClusterTransport};
use crate::version_tracker::VersionTracker;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

struct CacheEntry {
    /// Daemon generation the entry was parsed under; a restart invalidates
    /// the entry even when the version number coincides numerically.
    generation: u64,
    version: Option<u64>,
    data: ConfigValue,
}

pub struct ConfigCache {
    transport: Arc<dyn ClusterTransport>,
    tracker: Arc<VersionTracker>,
    registry: Arc<FileRegistry>,
    mount_point: PathBuf,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ConfigCache {
    pub fn new(
        transport: Arc<dyn ClusterTransport>,
        tracker: Arc<VersionTracker>,
        registry: Arc<FileRegistry>,
        mount_point: PathBuf,
    ) -> Self {
        Self {
            transport,
            tracker,
            registry,
            mount_point,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Read a configuration file, reusing the cached parse when fresh.
    ///
    /// An unknown governing version (unpublished file, guest id missing
    /// from the guest list) is treated as always-stale and refetches.
    pub async fn read(&self, name: &str) -> Result<ConfigValue> {
        let versions = self.tracker.current().await;
        let guests = self.tracker.guest_list().await;
        let (version, registration) =
            self.registry
                .resolve_version(name, &versions, &guests, false)?;
        let generation = versions.start_time;

        if version.is_some() {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(name) {
                if entry.generation == generation && entry.version == version {
                    return Ok(entry.data.clone());
                }
            }
        }

        let raw = fetch_config(&*self.transport, name).await?;
        let data = registration.parse(name, raw.as_deref())?;
        debug!(file = name, ?version, "configuration refetched");

        let mut entries = self.entries.write().await;
        entries.insert(
            name.to_string(),
            CacheEntry {
                generation,
                version,
                data: data.clone(),
            },
        );
        Ok(data)
    }

    /// Serialize and persist a configuration file, then drop its cache
    /// entry so the next read refetches instead of reusing pre-write state.
    ///
    /// The file is replaced atomically (write to a temporary sibling, then
    /// rename) so concurrent readers never observe a partial file.
    pub async fn write(&self, name: &str, value: &ConfigValue) -> Result<()> {
        let versions = self.tracker.current().await;
        let guests = self.tracker.guest_list().await;
        let (_, registration) = self.registry.resolve_version(name, &versions, &guests, true)?;
        let bytes = registration.serialize(name, value)?;

        let path = self.mount_point.join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        self.invalidate(name).await;
        debug!(file = name, bytes = bytes.len(), "configuration written");
        Ok(())
    }

    /// Drop one file's cache entry
    pub async fn invalidate(&self, name: &str) {
        self.entries.write().await.remove(name);
    }

    /// Drop every cache entry
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
