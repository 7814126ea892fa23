//! In-memory reference backend.
//!
//! Locks are always taken in the order primary map shard, Morton index
//! shard, accelerator. Writers hold the node's primary shard lock across the
//! version check, the store, the index update and cache invalidation, so the
//! check-then-increment is a single atomic step per id. Readers that promote
//! a node into the accelerator under a cell key hold that node's shard read
//! lock and the cell's index read lock, and promote only if the node still
//! sits in that cell and the index still names it. A stale copy never lands
//! after a newer write or under a cell its owner has left.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use glam::DVec3;
use octastore_common::{
    CancellationToken, ConsistencyLevel, NodeId, OctreeNode, SpatialBounds,
};
use octastore_morton::{MortonCodec, SpatialHashKey, cache_key, region_key};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::cache::NodeCache;
use crate::config::StorageConfig;
use crate::contract::{OctreeStorage, QueryResult, QuerySource, StorageStatistics, WriteResult};
use crate::error::{StorageError, WriteError};
use crate::stats::StatsRecorder;

/// Position of a node in the Morton index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MortonKey {
    level: u32,
    code: u64,
}

impl MortonKey {
    fn of(node: &OctreeNode) -> Self {
        Self {
            level: node.level,
            code: node.morton_code,
        }
    }
}

fn node_cache_key(id: &NodeId) -> String {
    format!("node:{id}")
}

/// Single-process storage engine with a Morton index and an LRU accelerator.
///
/// Replication is simulated: writes are applied locally and report the
/// acknowledgement count the requested consistency level would demand.
pub struct InMemoryOctreeStorage {
    config: StorageConfig,
    codec: MortonCodec,
    nodes: DashMap<NodeId, OctreeNode>,
    /// Ids per cell in write order. The last one owns the cell.
    index: DashMap<MortonKey, Vec<NodeId>>,
    cache: NodeCache,
    stats: StatsRecorder,
}

impl InMemoryOctreeStorage {
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let codec = MortonCodec::new(config.world_bounds, config.replication_factor)?;
        let cache = NodeCache::new(config.max_cache_size, config.enable_caching);
        tracing::debug!(
            max_cache_size = config.max_cache_size,
            replication_factor = config.replication_factor,
            max_level = config.max_level,
            "in-memory octree storage created"
        );
        Ok(Self {
            config,
            codec,
            nodes: DashMap::new(),
            index: DashMap::new(),
            cache,
            stats: StatsRecorder::new(),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn codec(&self) -> &MortonCodec {
        &self.codec
    }

    pub fn default_consistency(&self) -> ConsistencyLevel {
        self.config.default_consistency
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn query(&self, point: DVec3, lod: u32, consistency: ConsistencyLevel) -> QueryResult {
        let _span = tracing::debug_span!("query_material", lod, %consistency).entered();
        let started = Instant::now();
        self.stats.record_query();
        self.stats.record_consistency(consistency);

        let lod = lod.min(self.config.max_level);
        let keys = self.codec.hierarchical_keys(point, lod);

        let found = match self.probe_cache(&keys) {
            Some(node) => {
                self.stats.record_hit();
                Some((node, QuerySource::Cache))
            }
            None => {
                self.stats.record_miss();
                self.probe_index(&keys)
                    .or_else(|| self.scan_containing(point))
                    .map(|node| (node, QuerySource::Storage))
            }
        };

        let latency = started.elapsed();
        self.stats.record_latency(latency);
        match found {
            Some((node, source)) => {
                tracing::trace!(id = %node.id, level = node.level, %source, "material found");
                QueryResult::found(node, source, latency)
            }
            None => QueryResult::not_found(latency),
        }
    }

    /// Finest level first.
    fn probe_cache(&self, keys: &[SpatialHashKey]) -> Option<OctreeNode> {
        keys.iter().rev().find_map(|key| self.cache.get(&key.cache_key))
    }

    /// Exact Morton matches, finest level first.
    fn probe_index(&self, keys: &[SpatialHashKey]) -> Option<OctreeNode> {
        keys.iter().rev().find_map(|key| {
            let cell = MortonKey {
                level: key.level,
                code: key.morton_code,
            };
            let id = self.owner(cell)?;
            self.load_cell_owner(&id, cell)
        })
    }

    fn owner(&self, cell: MortonKey) -> Option<NodeId> {
        self.index.get(&cell).and_then(|ids| ids.last().cloned())
    }

    /// Load `id` and cache it under `cell`, provided it still occupies the
    /// cell and still owns it. Both checks and the promotion happen under the
    /// node's read lock and the cell's index read lock.
    fn load_cell_owner(&self, id: &NodeId, cell: MortonKey) -> Option<OctreeNode> {
        let stored = self.nodes.get(id)?;
        if MortonKey::of(&stored) != cell {
            return None;
        }
        let owners = self.index.get(&cell)?;
        if owners.last() != Some(id) {
            return None;
        }
        self.cache
            .promote(cache_key(cell.level, cell.code), stored.clone());
        Some(stored.clone())
    }

    /// Linear scan for the deepest stored node whose bounds contain `point`.
    /// A coarse ancestor supplies the material of any finer region that was
    /// never subdivided.
    fn scan_containing(&self, point: DVec3) -> Option<OctreeNode> {
        let mut candidates: Vec<(u32, NodeId)> = self
            .nodes
            .iter()
            .filter(|entry| entry.bounds.contains(point))
            .map(|entry| (entry.level, entry.id.clone()))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        candidates.into_iter().find_map(|(_, id)| {
            let stored = self.nodes.get(&id)?;
            if !stored.bounds.contains(point) {
                return None;
            }
            // Cached under its cell only while it owns that cell.
            let cell = MortonKey::of(&stored);
            if let Some(owners) = self.index.get(&cell) {
                if owners.last() == Some(&id) {
                    self.cache
                        .promote(cache_key(cell.level, cell.code), stored.clone());
                }
            }
            Some(stored.clone())
        })
    }

    fn fetch(&self, id: &NodeId) -> Option<OctreeNode> {
        let key = node_cache_key(id);
        if let Some(node) = self.cache.get(&key) {
            self.stats.record_hit();
            return Some(node);
        }
        self.stats.record_miss();
        let stored = self.nodes.get(id)?;
        self.cache.promote(key, stored.clone());
        Some(stored.clone())
    }

    fn write(
        &self,
        mut node: OctreeNode,
        consistency: ConsistencyLevel,
    ) -> Result<WriteResult, StorageError> {
        node.validate()?;
        if node.level > self.config.max_level {
            return Err(StorageError::InvalidArgument(format!(
                "node level {} exceeds max_level {}",
                node.level, self.config.max_level
            )));
        }
        let next_version = node.version.checked_add(1).ok_or_else(|| {
            StorageError::InvalidArgument(format!("node version {} cannot be advanced", node.version))
        })?;

        let _span = tracing::debug_span!("write_node", id = %node.id, level = node.level, %consistency)
            .entered();
        self.stats.record_write();
        self.stats.record_consistency(consistency);

        let id = node.id.clone();
        let new_version = match self.nodes.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                let stored = entry.get();
                if stored.version != node.version {
                    let error = WriteError::VersionConflict {
                        id,
                        stored: stored.version,
                        supplied: node.version,
                    };
                    tracing::debug!(%error, "write rejected");
                    return Ok(WriteResult::rejected(error));
                }
                let previous = MortonKey::of(stored);
                self.stamp(&mut node, next_version);
                if previous != MortonKey::of(&node) {
                    self.unindex(&id, previous);
                }
                self.reindex(&node);
                let version = node.version;
                entry.insert(node);
                version
            }
            Entry::Vacant(entry) => {
                self.stamp(&mut node, next_version);
                self.reindex(&node);
                let version = node.version;
                entry.insert(node);
                version
            }
        };

        let acknowledged = consistency.required_acks(self.config.replication_factor);
        tracing::debug!(new_version, acknowledged, "write accepted");
        Ok(WriteResult::accepted(new_version, acknowledged))
    }

    fn delete(&self, id: &NodeId, consistency: ConsistencyLevel) -> bool {
        let _span = tracing::debug_span!("delete_node", %id, %consistency).entered();
        self.stats.record_consistency(consistency);
        match self.nodes.entry(id.clone()) {
            Entry::Occupied(entry) => {
                self.unindex(id, MortonKey::of(entry.get()));
                entry.remove();
                tracing::debug!("node deleted");
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    fn region(
        &self,
        bounds: &SpatialBounds,
        max_level: u32,
    ) -> Result<Vec<OctreeNode>, StorageError> {
        bounds.validate()?;
        let mut found: Vec<OctreeNode> = self
            .nodes
            .iter()
            .filter(|entry| entry.level <= max_level && entry.bounds.intersects(bounds))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    fn snapshot_statistics(&self) -> StorageStatistics {
        let mut nodes_by_level = BTreeMap::new();
        for entry in self.nodes.iter() {
            *nodes_by_level.entry(entry.level).or_insert(0u64) += 1;
        }
        StorageStatistics {
            total_nodes: nodes_by_level.values().sum(),
            cache_hits: self.stats.cache_hits(),
            cache_misses: self.stats.cache_misses(),
            total_queries: self.stats.total_queries(),
            total_writes: self.stats.total_writes(),
            average_query_latency: self.stats.average_latency(),
            max_query_latency: self.stats.max_latency(),
            nodes_by_level,
            cached_entries: self.cache.len(),
            consistency_requests: self.stats.consistency_requests(),
        }
    }

    /// Set the new version, refresh the timestamp and record placement.
    fn stamp(&self, node: &mut OctreeNode, version: u64) {
        node.version = version;
        node.touch();
        let placement = self.codec.placement(node.morton_code, node.level);
        node.distributed_hash_key = Some(region_key(node.level, node.morton_code));
        node.replica_hashes = placement.replicas;
    }

    /// Make `node` the owner of its cell and drop every accelerator copy that
    /// may now be stale.
    fn reindex(&self, node: &OctreeNode) {
        {
            let mut owners = self.index.entry(MortonKey::of(node)).or_default();
            owners.retain(|owner| owner != &node.id);
            owners.push(node.id.clone());
        }
        self.cache.invalidate(&[
            node_cache_key(&node.id),
            cache_key(node.level, node.morton_code),
        ]);
    }

    /// Take `id` out of the cell at `key`, handing ownership to the most
    /// recently written node left there, and drop the accelerator copies
    /// under that cell and the node id.
    fn unindex(&self, id: &NodeId, key: MortonKey) {
        if let Entry::Occupied(mut owners) = self.index.entry(key) {
            owners.get_mut().retain(|owner| owner != id);
            if owners.get().is_empty() {
                owners.remove();
            }
        }
        self.cache
            .invalidate(&[node_cache_key(id), cache_key(key.level, key.code)]);
    }
}

impl OctreeStorage for InMemoryOctreeStorage {
    async fn query_material(
        &self,
        point: DVec3,
        lod: u32,
        consistency: ConsistencyLevel,
        _cancel: &CancellationToken,
    ) -> QueryResult {
        self.query(point, lod, consistency)
    }

    async fn get_node(
        &self,
        id: &NodeId,
        consistency: ConsistencyLevel,
        _cancel: &CancellationToken,
    ) -> Option<OctreeNode> {
        self.stats.record_consistency(consistency);
        self.fetch(id)
    }

    async fn get_node_by_morton(
        &self,
        morton_code: u64,
        level: u32,
        consistency: ConsistencyLevel,
        _cancel: &CancellationToken,
    ) -> Option<OctreeNode> {
        self.stats.record_consistency(consistency);
        let key = MortonKey {
            level,
            code: morton_code,
        };
        let id = self.owner(key)?;
        self.fetch(&id)
    }

    async fn write_node(
        &self,
        node: OctreeNode,
        consistency: ConsistencyLevel,
        _cancel: &CancellationToken,
    ) -> Result<WriteResult, StorageError> {
        self.write(node, consistency)
    }

    async fn delete_node(
        &self,
        id: &NodeId,
        consistency: ConsistencyLevel,
        _cancel: &CancellationToken,
    ) -> bool {
        self.delete(id, consistency)
    }

    async fn query_region(
        &self,
        bounds: &SpatialBounds,
        max_level: u32,
        _cancel: &CancellationToken,
    ) -> Result<Vec<OctreeNode>, StorageError> {
        self.region(bounds, max_level)
    }

    async fn statistics(&self) -> StorageStatistics {
        self.snapshot_statistics()
    }

    async fn clear_cache(&self) {
        self.cache.clear();
        tracing::debug!("accelerator cleared");
    }
}
