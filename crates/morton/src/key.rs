use octastore_common::SpatialBounds;
use serde::{Deserialize, Serialize};

use crate::hash::Placement;

/// Routing key of a region: zero-padded level and hex Morton code.
pub fn region_key(level: u32, morton_code: u64) -> String {
    format!("{level:02}:{morton_code:016X}")
}

/// Accelerator key of the octree cell at `level`/`morton_code`.
pub fn cache_key(level: u32, morton_code: u64) -> String {
    format!("octree:{}", region_key(level, morton_code))
}

/// Everything needed to address, cache and place one octree cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialHashKey {
    pub level: u32,
    pub morton_code: u64,
    pub region_key: String,
    pub cache_key: String,
    pub placement: Placement,
    /// World-space box the code denotes at `level`.
    pub region: SpatialBounds,
}

impl SpatialHashKey {
    pub fn primary_hash(&self) -> u64 {
        self.placement.primary
    }

    pub fn replica_hashes(&self) -> &[u64] {
        &self.placement.replicas
    }
}
