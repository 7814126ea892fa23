use glam::DVec3;
use octastore_common::{CancellationToken, ConsistencyLevel, NodeId, OctreeNode, SpatialBounds};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::StorageConfig;
use crate::contract::{OctreeStorage, QueryResult, StorageStatistics, WriteResult};
use crate::error::StorageError;
use crate::memory::InMemoryOctreeStorage;

/// Backend variants a caller can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    InMemory,
    /// Key-value cluster backend. Not built yet.
    Redis,
    /// Wide-column persistent backend. Not built yet.
    Cassandra,
}

impl StorageKind {
    pub const ALL: [StorageKind; 3] = [Self::InMemory, Self::Redis, Self::Cassandra];

    pub fn is_implemented(self) -> bool {
        matches!(self, Self::InMemory)
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InMemory => "in-memory",
            Self::Redis => "redis",
            Self::Cassandra => "cassandra",
        };
        f.write_str(name)
    }
}

impl FromStr for StorageKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| StorageError::InvalidArgument(format!("unknown storage kind: {s}")))
    }
}

/// A constructed backend. Dispatches the storage contract to the variant.
pub enum StorageBackend {
    InMemory(InMemoryOctreeStorage),
}

impl StorageBackend {
    pub fn kind(&self) -> StorageKind {
        match self {
            Self::InMemory(_) => StorageKind::InMemory,
        }
    }

    pub fn config(&self) -> &StorageConfig {
        match self {
            Self::InMemory(storage) => storage.config(),
        }
    }

    /// In-memory backend over the planet-scale preset.
    pub fn earth() -> Result<Self, StorageError> {
        create_storage(StorageKind::InMemory, StorageConfig::earth())
    }

    /// In-memory backend over the small testing preset.
    pub fn for_testing() -> Result<Self, StorageError> {
        create_storage(StorageKind::InMemory, StorageConfig::for_testing())
    }
}

/// Build a backend of the requested kind.
///
/// Unimplemented kinds fail here rather than at first use.
pub fn create_storage(
    kind: StorageKind,
    config: StorageConfig,
) -> Result<StorageBackend, StorageError> {
    match kind {
        StorageKind::InMemory => Ok(StorageBackend::InMemory(InMemoryOctreeStorage::new(
            config,
        )?)),
        StorageKind::Redis | StorageKind::Cassandra => {
            tracing::warn!(%kind, "requested storage backend is not implemented");
            Err(StorageError::NotImplemented(kind))
        }
    }
}

impl OctreeStorage for StorageBackend {
    async fn query_material(
        &self,
        point: DVec3,
        lod: u32,
        consistency: ConsistencyLevel,
        cancel: &CancellationToken,
    ) -> QueryResult {
        match self {
            Self::InMemory(storage) => storage.query_material(point, lod, consistency, cancel).await,
        }
    }

    async fn get_node(
        &self,
        id: &NodeId,
        consistency: ConsistencyLevel,
        cancel: &CancellationToken,
    ) -> Option<OctreeNode> {
        match self {
            Self::InMemory(storage) => storage.get_node(id, consistency, cancel).await,
        }
    }

    async fn get_node_by_morton(
        &self,
        morton_code: u64,
        level: u32,
        consistency: ConsistencyLevel,
        cancel: &CancellationToken,
    ) -> Option<OctreeNode> {
        match self {
            Self::InMemory(storage) => {
                storage
                    .get_node_by_morton(morton_code, level, consistency, cancel)
                    .await
            }
        }
    }

    async fn write_node(
        &self,
        node: OctreeNode,
        consistency: ConsistencyLevel,
        cancel: &CancellationToken,
    ) -> Result<WriteResult, StorageError> {
        match self {
            Self::InMemory(storage) => storage.write_node(node, consistency, cancel).await,
        }
    }

    async fn delete_node(
        &self,
        id: &NodeId,
        consistency: ConsistencyLevel,
        cancel: &CancellationToken,
    ) -> bool {
        match self {
            Self::InMemory(storage) => storage.delete_node(id, consistency, cancel).await,
        }
    }

    async fn query_region(
        &self,
        bounds: &SpatialBounds,
        max_level: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<OctreeNode>, StorageError> {
        match self {
            Self::InMemory(storage) => storage.query_region(bounds, max_level, cancel).await,
        }
    }

    async fn statistics(&self) -> StorageStatistics {
        match self {
            Self::InMemory(storage) => storage.statistics().await,
        }
    }

    async fn clear_cache(&self) {
        match self {
            Self::InMemory(storage) => storage.clear_cache().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_is_created() {
        let backend = create_storage(StorageKind::InMemory, StorageConfig::for_testing()).unwrap();
        assert_eq!(backend.kind(), StorageKind::InMemory);
        assert_eq!(backend.config().max_level, 10);
        assert_eq!(StorageBackend::earth().unwrap().config().max_level, 20);
    }

    #[test]
    fn placeholders_fail_at_selection() {
        for kind in [StorageKind::Redis, StorageKind::Cassandra] {
            assert!(!kind.is_implemented());
            let err = create_storage(kind, StorageConfig::for_testing()).err().unwrap();
            assert!(matches!(err, StorageError::NotImplemented(k) if k == kind));
            assert!(err.to_string().contains("not implemented"));
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = StorageConfig::for_testing();
        config.world_bounds.max.x = config.world_bounds.min.x;
        let err = create_storage(StorageKind::InMemory, config).err().unwrap();
        assert!(matches!(err, StorageError::InvalidBounds(_)));
    }

    #[test]
    fn kinds_parse_from_their_names() {
        for kind in StorageKind::ALL {
            assert_eq!(kind.to_string().parse::<StorageKind>().unwrap(), kind);
        }
        assert_eq!("In-Memory".parse::<StorageKind>().unwrap(), StorageKind::InMemory);
        assert!("postgres".parse::<StorageKind>().is_err());
    }

    #[test]
    fn backend_dispatches_the_contract() {
        let backend = StorageBackend::for_testing().unwrap();
        let cancel = CancellationToken::new();
        let node = OctreeNode::new(
            "root",
            0,
            0,
            backend.config().world_bounds,
        )
        .with_material(4);
        let written =
            pollster::block_on(backend.write_node(node, ConsistencyLevel::All, &cancel)).unwrap();
        assert_eq!(written.acknowledged_replicas, 2);

        let result = pollster::block_on(backend.query_material(
            DVec3::splat(1.0),
            3,
            ConsistencyLevel::One,
            &cancel,
        ));
        assert_eq!(result.material_id, Some(4));
    }
}
