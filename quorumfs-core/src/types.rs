//! Shared data types: version vector, cluster membership, guest list

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Snapshot of the daemon's generation counters.
///
/// Every trackable piece of shared state carries a monotonically increasing
/// version; `start_time` identifies the daemon epoch and a change there
/// invalidates every version observed before it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionVector {
    /// Daemon start time; zero means "no daemon observed"
    #[serde(rename = "starttime", default)]
    pub start_time: u64,

    /// Per-filename versions for registered configuration files
    #[serde(rename = "configs", default)]
    pub config_versions: HashMap<String, u64>,

    /// Version of the cluster membership snapshot
    #[serde(rename = "membership", default)]
    pub membership_version: u64,

    /// Version of the guest (VM/container) list
    #[serde(rename = "guests", default)]
    pub guest_list_version: u64,

    /// Per-node, per-key versions for the ephemeral status store
    #[serde(rename = "kv", default)]
    pub kv_versions: HashMap<String, HashMap<String, u64>>,
}

impl VersionVector {
    /// True when no daemon generation has been observed
    pub fn is_empty(&self) -> bool {
        self.start_time == 0
    }

    pub fn config_version(&self, name: &str) -> Option<u64> {
        self.config_versions.get(name).copied()
    }

    pub fn kv_version(&self, node: &str, key: &str) -> Option<u64> {
        self.kv_versions.get(node).and_then(|m| m.get(key)).copied()
    }
}

/// One cluster member as reported by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub ip: String,
    #[serde(rename = "nodeid")]
    pub node_id: u64,
    pub votes: u32,
    pub online: bool,
}

/// Cluster membership, rebuilt wholesale whenever the membership version
/// changes; never patched field-by-field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterMembership {
    nodes: BTreeMap<String, NodeInfo>,
}

impl ClusterMembership {
    pub fn new(nodes: Vec<NodeInfo>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.name.clone(), n)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&NodeInfo> {
        self.nodes.get(name)
    }

    /// Node names in stable (lexicographic) order
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Guest flavor, selecting the type-scoped configuration directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuestKind {
    #[serde(rename = "vm")]
    Vm,
    #[serde(rename = "ct")]
    Container,
}

impl GuestKind {
    /// Directory under the store mount point holding this kind's config files
    pub fn config_dir(&self) -> &'static str {
        match self {
            GuestKind::Vm => "vms",
            GuestKind::Container => "containers",
        }
    }

    pub fn from_config_dir(dir: &str) -> Option<Self> {
        match dir {
            "vms" => Some(GuestKind::Vm),
            "containers" => Some(GuestKind::Container),
            _ => None,
        }
    }
}

/// One guest list entry; `version` governs the freshness of the guest's
/// individual configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestEntry {
    pub id: u32,
    pub kind: GuestKind,
    /// Node currently responsible for the guest
    pub node: String,
    pub version: u64,
}

/// The cluster-wide VM/container list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuestList {
    guests: HashMap<u32, GuestEntry>,
}

impl GuestList {
    pub fn new(guests: Vec<GuestEntry>) -> Self {
        Self {
            guests: guests.into_iter().map(|g| (g.id, g)).collect(),
        }
    }

    pub fn get(&self, id: u32) -> Option<&GuestEntry> {
        self.guests.get(&id)
    }

    pub fn version_of(&self, id: u32) -> Option<u64> {
        self.guests.get(&id).map(|g| g.version)
    }

    pub fn len(&self) -> usize {
        self.guests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guests.is_empty()
    }
}

/// One entry of the daemon's cluster-wide log ring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterLogEntry {
    pub time: u64,
    pub node: String,
    pub priority: u8,
    pub ident: String,
    pub tag: String,
    pub message: String,
    #[serde(default)]
    pub user: Option<String>,
}
