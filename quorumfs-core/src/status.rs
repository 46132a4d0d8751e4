//! Ephemeral per-node status broadcasting
//!
//! Nodes publish small key-value blobs (task lists, metrics) through the
//! daemon and read any node's blobs back through the same versioned-cache
//! pattern the configuration cache uses. Publication is best effort and
//! never blocks normal operation; per-node read failures are logged and
//! that node's contribution is omitted from the aggregate.

use crate::transport::{
    encode_status_get, encode_status_update, ClusterTransport, MessageKind,
};
use crate::version_tracker::VersionTracker;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

struct StatusEntry {
    generation: u64,
    version: u64,
    data: serde_json::Value,
}

/// One node's published record for a status key
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStatus {
    pub node: String,
    pub data: serde_json::Value,
}

pub struct StatusBroadcaster {
    transport: Arc<dyn ClusterTransport>,
    tracker: Arc<VersionTracker>,
    entries: RwLock<HashMap<(String, String), StatusEntry>>,
}

impl StatusBroadcaster {
    pub fn new(transport: Arc<dyn ClusterTransport>, tracker: Arc<VersionTracker>) -> Self {
        Self {
            transport,
            tracker,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Publish this node's blob for a status key. Best effort: failures are
    /// logged and swallowed, status publication must never fail the caller.
    pub async fn publish<T: Serialize>(&self, key: &str, data: &T) {
        let blob = match serde_json::to_vec(data) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(key, error = %e, "status blob serialization failed");
                return;
            }
        };
        let payload = encode_status_update(key, &blob);
        if let Err(e) = self.transport.send(MessageKind::StatusUpdate, &payload).await {
            warn!(key, error = %e, "status publish failed");
        }
    }

    /// Collect the published records for a key across the cluster, or for a
    /// single node when `node_filter` is given. Results are ordered by node
    /// name; nodes without a published version and nodes whose fetch fails
    /// are omitted, never failing the aggregate.
    pub async fn fetch(&self, key: &str, node_filter: Option<&str>) -> Vec<NodeStatus> {
        let versions = self.tracker.current().await;
        let membership = self.tracker.membership().await;
        let generation = versions.start_time;

        let mut records = Vec::new();
        for node in membership.node_names() {
            if node_filter.is_some_and(|filter| filter != node) {
                continue;
            }
            let Some(version) = versions.kv_version(node, key) else {
                continue;
            };

            let cache_key = (node.to_string(), key.to_string());
            {
                let entries = self.entries.read().await;
                if let Some(entry) = entries.get(&cache_key) {
                    if entry.generation == generation && entry.version == version {
                        records.push(NodeStatus {
                            node: node.to_string(),
                            data: entry.data.clone(),
                        });
                        continue;
                    }
                }
            }

            let payload = encode_status_get(node, key);
            let raw = match self.transport.send(MessageKind::StatusGet, &payload).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(node, key, error = %e, "status fetch failed, omitting node");
                    continue;
                }
            };
            let data: serde_json::Value = match serde_json::from_slice(&raw) {
                Ok(data) => data,
                Err(e) => {
                    warn!(node, key, error = %e, "status blob undecodable, omitting node");
                    continue;
                }
            };

            self.entries.write().await.insert(
                cache_key,
                StatusEntry {
                    generation,
                    version,
                    data: data.clone(),
                },
            );
            records.push(NodeStatus {
                node: node.to_string(),
                data,
            });
        }
        records
    }

    /// Drop every cached record
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
