//! Runtime settings for the quorumfs client
//!
//! This module centralizes all configurable constants, making them
//! easy to override via environment variables for different deployments.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Parse an environment variable as a typed value with a default fallback
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Daemon transport configuration
pub struct TransportConfig {
    /// Path of the daemon's Unix-domain socket
    pub socket_path: PathBuf,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_path: env_var_or_default(
                "QUORUMFS_SOCKET",
                PathBuf::from("/run/quorumfs/daemon.sock"),
            ),
        }
    }
}

/// Shared configuration store layout
pub struct StoreConfig {
    /// Mount point of the replicated configuration filesystem
    pub mount_point: PathBuf,
    /// Directory under the mount point holding cluster-wide lock directories
    pub lock_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let mount_point: PathBuf =
            env_var_or_default("QUORUMFS_MOUNT", PathBuf::from("/etc/quorumfs"));
        let lock_dir = mount_point.join("priv/lock");
        Self {
            mount_point,
            lock_dir,
        }
    }
}

/// Cluster lock timeouts
pub struct LockConfig {
    /// Default lock acquisition timeout in milliseconds
    pub acquire_timeout_ms: u64,
    /// Critical-section execution budget in milliseconds
    pub execution_timeout_ms: u64,
    /// Delay between lock acquisition retries in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: env_var_or_default("QUORUMFS_LOCK_ACQUIRE_TIMEOUT_MS", 10_000),
            execution_timeout_ms: env_var_or_default("QUORUMFS_LOCK_EXECUTION_TIMEOUT_MS", 60_000),
            poll_interval_ms: env_var_or_default("QUORUMFS_LOCK_POLL_INTERVAL_MS", 1_000),
        }
    }
}

impl LockConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Global configuration instance
#[derive(Default)]
pub struct Config {
    pub transport: TransportConfig,
    pub store: StoreConfig,
    pub lock: LockConfig,
}
