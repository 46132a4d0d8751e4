//! Cluster-wide exclusive locks over the shared store
//!
//! The replicated filesystem already guarantees create-exclusivity cluster
//! wide, so directory creation under the shared lock directory is the
//! test-and-set primitive. Waiters poll, touching the holder's directory
//! mtime as a contention hint between attempts. An acquisition attempt runs
//! Idle -> Acquiring -> Holding -> Released, with error exits on acquire
//! timeout (reclassified as a quorum failure when the quorum signal is
//! absent at that moment) and on critical-section timeout. After an
//! execution timeout the lock directory is deliberately left in place:
//! the protected state is unknown and releasing could admit a second
//! concurrent holder, so recovery is an operator action.

use crate::error::{QuorumFsError, Result};
use crate::version_tracker::VersionTracker;
use async_trait::async_trait;
use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Quorum signal: the store flips the owner write bit on its mount point
/// while the cluster is quorate. Polled, never pushed.
pub fn quorate(mount_point: &Path) -> bool {
    std::fs::metadata(mount_point)
        .map(|m| m.permissions().mode() & 0o200 != 0)
        .unwrap_or(false)
}

/// Mutual exclusion backed by an atomic create-if-absent primitive on the
/// shared store.
#[async_trait]
pub trait DistributedMutex: Send + Sync {
    /// One atomic acquisition attempt; false means currently held elsewhere
    async fn try_acquire(&self) -> Result<bool>;

    /// Hint to the current holder's monitoring that someone is waiting
    async fn signal_contention(&self);

    async fn release(&self) -> Result<()>;
}

/// Directory-creation mutex on the replicated filesystem
pub struct DirMutex {
    dir: PathBuf,
}

impl DirMutex {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DistributedMutex for DirMutex {
    async fn try_acquire(&self) -> Result<bool> {
        match tokio::fs::create_dir(&self.dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn signal_contention(&self) {
        // Best effort: bump the holder directory's mtime.
        if let Ok(dir) = std::fs::File::open(&self.dir) {
            let _ = dir.set_modified(SystemTime::now());
        }
    }

    async fn release(&self) -> Result<()> {
        tokio::fs::remove_dir(&self.dir).await?;
        Ok(())
    }
}

pub struct LockManager {
    tracker: Arc<VersionTracker>,
    mount_point: PathBuf,
    lock_root: PathBuf,
    execution_timeout: Duration,
    poll_interval: Duration,
}

impl LockManager {
    pub fn new(
        tracker: Arc<VersionTracker>,
        mount_point: PathBuf,
        lock_root: PathBuf,
        execution_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            tracker,
            mount_point,
            lock_root,
            execution_timeout,
            poll_interval,
        }
    }

    /// Run `section` while holding the named cluster-wide lock.
    ///
    /// Acquisition is bounded by `acquire_timeout`; once held, the section
    /// runs under the independent execution budget. The tracker is
    /// refreshed after acquisition so the section observes current
    /// generation numbers. Ordinary section errors release the lock and
    /// propagate unchanged.
    pub async fn with_lock<T, F, Fut>(
        &self,
        lock_id: &str,
        acquire_timeout: Duration,
        section: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        tokio::fs::create_dir_all(&self.lock_root)
            .await
            .map_err(|e| QuorumFsError::LockUnavailable {
                details: format!("{}: {}", self.lock_root.display(), e),
            })?;

        let mutex = DirMutex::new(self.lock_root.join(lock_id));
        let deadline = Instant::now() + acquire_timeout;

        while !mutex.try_acquire().await? {
            if Instant::now() >= deadline {
                // A timeout while partitioned is almost always a quorum
                // problem, not contention; surface the specific diagnosis.
                if !quorate(&self.mount_point) {
                    return Err(QuorumFsError::NoQuorum {
                        lock_id: lock_id.to_string(),
                    });
                }
                return Err(QuorumFsError::AcquireTimeout {
                    lock_id: lock_id.to_string(),
                    duration: acquire_timeout,
                });
            }
            mutex.signal_contention().await;
            tokio::time::sleep(self.poll_interval).await;
        }

        debug!(lock_id, "cluster lock acquired");
        self.tracker.refresh().await;

        match tokio::time::timeout(self.execution_timeout, section()).await {
            Err(_) => {
                // State unknown: do not release, force operator recovery.
                warn!(
                    lock_id,
                    timeout = ?self.execution_timeout,
                    "critical section timed out, leaving lock in place"
                );
                Err(QuorumFsError::ExecutionTimeout {
                    lock_id: lock_id.to_string(),
                    duration: self.execution_timeout,
                })
            }
            Ok(result) => {
                if let Err(e) = mutex.release().await {
                    warn!(lock_id, error = %e, "failed to release cluster lock");
                }
                result
            }
        }
    }
}
