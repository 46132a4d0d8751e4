//! Version-vector tracking and daemon-restart detection
//!
//! The tracker fetches the daemon's version vector on demand and keeps the
//! membership and guest-list snapshots alongside it, refetching each only
//! when its own version field moved. A changed daemon start time means a
//! restart: everything observed before it is meaningless and both snapshots
//! are dropped before the new vector is installed. Fetch failures degrade
//! to empty state with a logged warning; this path is designed to serve
//! stale-but-available data rather than fail.

use crate::transport::{send_json, ClusterTransport, MessageKind};
use crate::types::{ClusterMembership, GuestEntry, GuestList, NodeInfo, VersionVector};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Deserialize)]
struct MembershipWire {
    #[serde(default)]
    nodes: Vec<NodeInfo>,
}

#[derive(Deserialize)]
struct GuestListWire {
    #[serde(default)]
    guests: Vec<GuestEntry>,
}

#[derive(Default)]
struct TrackerState {
    versions: VersionVector,
    membership: ClusterMembership,
    guests: GuestList,
    /// Version fields at the last successful snapshot fetch; `None` forces
    /// a refetch on the next refresh.
    fetched_membership: Option<u64>,
    fetched_guests: Option<u64>,
}

/// Outcome of a refresh, letting callers drop their own dependent state
/// when the daemon generation changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub generation_changed: bool,
}

pub struct VersionTracker {
    transport: Arc<dyn ClusterTransport>,
    state: RwLock<TrackerState>,
}

impl VersionTracker {
    pub fn new(transport: Arc<dyn ClusterTransport>) -> Self {
        Self {
            transport,
            state: RwLock::new(TrackerState::default()),
        }
    }

    /// Fetch the current version vector and opportunistically refresh the
    /// membership and guest-list snapshots. Never fails: a version fetch
    /// problem resets the tracker to the empty state, after which every
    /// dependent cache treats its contents as stale.
    pub async fn refresh(&self) -> RefreshOutcome {
        let fetched: Option<VersionVector> =
            match send_json(&*self.transport, MessageKind::GetVersionVector, &[]).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!(error = %e, "version vector fetch failed, treating state as unknown");
                    None
                }
            };

        let mut state = self.state.write().await;

        let Some(new) = fetched.filter(|v| !v.is_empty()) else {
            let generation_changed = !state.versions.is_empty();
            *state = TrackerState::default();
            return RefreshOutcome { generation_changed };
        };

        let generation_changed = new.start_time != state.versions.start_time;
        if generation_changed {
            debug!(
                old = state.versions.start_time,
                new = new.start_time,
                "daemon generation changed, dropping all snapshots"
            );
            state.membership = ClusterMembership::default();
            state.guests = GuestList::default();
            state.fetched_membership = None;
            state.fetched_guests = None;
        }

        // Snapshot refetches are isolated: one failing fetch resets only
        // that snapshot and never blocks the other.
        if state.fetched_membership != Some(new.membership_version) {
            match send_json::<MembershipWire>(&*self.transport, MessageKind::GetMembership, &[])
                .await
            {
                Ok(wire) => {
                    state.membership = ClusterMembership::new(wire.nodes);
                    state.fetched_membership = Some(new.membership_version);
                }
                Err(e) => {
                    warn!(error = %e, "membership fetch failed, dropping snapshot");
                    state.membership = ClusterMembership::default();
                    state.fetched_membership = None;
                }
            }
        }

        if state.fetched_guests != Some(new.guest_list_version) {
            match send_json::<GuestListWire>(&*self.transport, MessageKind::GetGuestList, &[]).await
            {
                Ok(wire) => {
                    state.guests = GuestList::new(wire.guests);
                    state.fetched_guests = Some(new.guest_list_version);
                }
                Err(e) => {
                    warn!(error = %e, "guest list fetch failed, dropping snapshot");
                    state.guests = GuestList::default();
                    state.fetched_guests = None;
                }
            }
        }

        state.versions = new;
        RefreshOutcome { generation_changed }
    }

    /// Current version vector (empty when no daemon has been observed)
    pub async fn current(&self) -> VersionVector {
        self.state.read().await.versions.clone()
    }

    pub async fn membership(&self) -> ClusterMembership {
        self.state.read().await.membership.clone()
    }

    pub async fn guest_list(&self) -> GuestList {
        self.state.read().await.guests.clone()
    }
}
