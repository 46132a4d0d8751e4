pub mod client;
pub mod config;
pub mod config_cache;
pub mod error;
pub mod lock;
pub mod registry;
pub mod section_tree;
pub mod status;
pub mod transport;
pub mod types;
pub mod version_tracker;

// Test helpers are exposed for integration tests
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
