//! Storage: octree node store with Morton index, LRU accelerator and
//! optimistic concurrency.
//!
//! # Invariants
//! - The primary map owns every node. The Morton index and the accelerator
//!   never disagree with it once a write or delete has returned.
//! - A write to an existing id succeeds only if the supplied version equals
//!   the stored one, and bumps it by exactly one.
//! - Version conflicts are reported in [`WriteResult`], never as `Err`.
//! - Missing data is `None`, `false`, an empty list or a not-found
//!   [`QueryResult`], never an error.
//!
//! # Workaround
//! Point fallback and region queries scan every stored node. That is fine at
//! prototype scale; a real spatial index (R-tree, BVH) is still owed.

mod cache;
mod config;
mod contract;
mod error;
mod factory;
mod memory;
mod stats;

pub use cache::LruCache;
pub use config::StorageConfig;
pub use contract::{OctreeStorage, QueryResult, QuerySource, StorageStatistics, WriteResult};
pub use error::{StorageError, WriteError};
pub use factory::{StorageBackend, StorageKind, create_storage};
pub use memory::InMemoryOctreeStorage;
pub use stats::LatencyWindow;

pub fn crate_info() -> &'static str {
    "octastore-storage v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("storage"));
    }
}
