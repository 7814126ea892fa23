use glam::DVec3;
use octastore_common::{
    CancellationToken, ConsistencyLevel, MaterialId, NodeId, OctreeNode, SpatialBounds,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::error::{StorageError, WriteError};

/// Where a query answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QuerySource {
    Cache,
    Storage,
    NotFound,
}

impl fmt::Display for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cache => "cache",
            Self::Storage => "storage",
            Self::NotFound => "not-found",
        };
        f.write_str(name)
    }
}

/// Answer to a material query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub success: bool,
    pub node: Option<OctreeNode>,
    pub material_id: Option<MaterialId>,
    pub source: QuerySource,
    pub latency: Duration,
}

impl QueryResult {
    pub(crate) fn found(node: OctreeNode, source: QuerySource, latency: Duration) -> Self {
        Self {
            success: true,
            material_id: Some(node.material_id),
            node: Some(node),
            source,
            latency,
        }
    }

    /// No data placed at the position yet. Not an error.
    pub(crate) fn not_found(latency: Duration) -> Self {
        Self {
            success: false,
            node: None,
            material_id: None,
            source: QuerySource::NotFound,
            latency,
        }
    }
}

/// Outcome of a write. A version conflict is a failed result, not an `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    pub success: bool,
    /// Stored version after the write; 0 when the write was refused.
    pub new_version: u64,
    pub error: Option<WriteError>,
    pub acknowledged_replicas: u32,
}

impl WriteResult {
    pub(crate) fn accepted(new_version: u64, acknowledged_replicas: u32) -> Self {
        Self {
            success: true,
            new_version,
            error: None,
            acknowledged_replicas,
        }
    }

    pub(crate) fn rejected(error: WriteError) -> Self {
        Self {
            success: false,
            new_version: 0,
            error: Some(error),
            acknowledged_replicas: 0,
        }
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self.error, Some(WriteError::VersionConflict { .. }))
    }
}

/// Point-in-time counters of one storage instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageStatistics {
    pub total_nodes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_queries: u64,
    pub total_writes: u64,
    /// Mean over the most recent 1000 material queries.
    pub average_query_latency: Duration,
    pub max_query_latency: Duration,
    pub nodes_by_level: BTreeMap<u32, u64>,
    pub cached_entries: usize,
    pub consistency_requests: BTreeMap<ConsistencyLevel, u64>,
}

impl StorageStatistics {
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

/// Operations every storage backend offers.
///
/// Every operation returns a future so networked backends can suspend; the
/// in-memory engine resolves them without yielding. `consistency` governs
/// how many replicas must acknowledge. `cancel` is honoured by backends that
/// perform I/O.
pub trait OctreeStorage: Send + Sync {
    /// Most specific known material covering `point`, probing levels `0..=lod`.
    fn query_material(
        &self,
        point: DVec3,
        lod: u32,
        consistency: ConsistencyLevel,
        cancel: &CancellationToken,
    ) -> impl Future<Output = QueryResult> + Send;

    fn get_node(
        &self,
        id: &NodeId,
        consistency: ConsistencyLevel,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Option<OctreeNode>> + Send;

    fn get_node_by_morton(
        &self,
        morton_code: u64,
        level: u32,
        consistency: ConsistencyLevel,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Option<OctreeNode>> + Send;

    /// Create or update a node under optimistic concurrency. `Err` only for
    /// malformed input.
    fn write_node(
        &self,
        node: OctreeNode,
        consistency: ConsistencyLevel,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<WriteResult, StorageError>> + Send;

    /// `false` if the node did not exist.
    fn delete_node(
        &self,
        id: &NodeId,
        consistency: ConsistencyLevel,
        cancel: &CancellationToken,
    ) -> impl Future<Output = bool> + Send;

    /// Stored nodes with `level <= max_level` whose bounds intersect `bounds`.
    fn query_region(
        &self,
        bounds: &SpatialBounds,
        max_level: u32,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<OctreeNode>, StorageError>> + Send;

    fn statistics(&self) -> impl Future<Output = StorageStatistics> + Send;

    /// Drop accelerator contents. The primary store is untouched.
    fn clear_cache(&self) -> impl Future<Output = ()> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_without_traffic_is_zero() {
        assert_eq!(StorageStatistics::default().cache_hit_rate(), 0.0);
    }

    #[test]
    fn hit_rate_over_all_lookups() {
        let stats = StorageStatistics {
            cache_hits: 3,
            cache_misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.cache_hit_rate(), 0.75);
    }

    #[test]
    fn rejected_write_reports_conflict() {
        let result = WriteResult::rejected(WriteError::VersionConflict {
            id: NodeId::from("A"),
            stored: 1,
            supplied: 0,
        });
        assert!(!result.success);
        assert!(result.is_version_conflict());
        assert_eq!(result.acknowledged_replicas, 0);
        assert!(result.error.unwrap().to_string().contains("version conflict"));
    }

    #[test]
    fn source_names() {
        assert_eq!(QuerySource::Cache.to_string(), "cache");
        assert_eq!(QuerySource::Storage.to_string(), "storage");
        assert_eq!(QuerySource::NotFound.to_string(), "not-found");
    }
}
