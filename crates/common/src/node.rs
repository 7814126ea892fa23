use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::bounds::{BoundsError, SpatialBounds};
use crate::types::NodeId;

/// Opaque material tag carried by a node.
pub type MaterialId = u32;

/// Number of children of an octree node.
pub const OCTANTS: usize = 8;

/// Errors from validating a node before it is stored.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeError {
    #[error("node id must not be empty")]
    EmptyId,
    #[error("homogeneity {0} outside [0, 1]")]
    Homogeneity(f64),
    #[error("invalid node bounds: {0}")]
    Bounds(#[from] BoundsError),
}

/// Addressable, versioned, material-bearing unit of the octree.
///
/// Children and parent are references by id. They are resolved through the
/// storage engine and never embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OctreeNode {
    pub id: NodeId,
    /// Depth in the octree; 0 is the root.
    pub level: u32,
    /// Z-order code of the node's cell at `level`.
    pub morton_code: u64,
    pub bounds: SpatialBounds,
    pub material_id: MaterialId,
    /// Fraction in `[0, 1]`; 1.0 means the material beneath is uniform.
    pub homogeneity: f64,
    pub is_leaf: bool,
    pub children: [Option<NodeId>; OCTANTS],
    pub parent: Option<NodeId>,
    /// Optimistic concurrency version. 0 for a node that was never written.
    pub version: u64,
    pub last_modified: SystemTime,
    /// Region key used to route the node to a storage server.
    pub distributed_hash_key: Option<String>,
    pub replica_hashes: Vec<u64>,
}

impl OctreeNode {
    /// A homogeneous leaf of material 0 at version 0.
    pub fn new(id: impl Into<NodeId>, level: u32, morton_code: u64, bounds: SpatialBounds) -> Self {
        Self {
            id: id.into(),
            level,
            morton_code,
            bounds,
            material_id: 0,
            homogeneity: 1.0,
            is_leaf: true,
            children: Default::default(),
            parent: None,
            version: 0,
            last_modified: SystemTime::now(),
            distributed_hash_key: None,
            replica_hashes: Vec::new(),
        }
    }

    pub fn with_material(mut self, material_id: MaterialId) -> Self {
        self.material_id = material_id;
        self
    }

    pub fn with_homogeneity(mut self, homogeneity: f64) -> Self {
        self.homogeneity = homogeneity;
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<NodeId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Attach a child reference in the given octant. A node with children is not a leaf.
    ///
    /// # Panics
    ///
    /// Panics if `octant` is not below [`OCTANTS`].
    pub fn with_child(mut self, octant: usize, child: impl Into<NodeId>) -> Self {
        assert!(octant < OCTANTS, "octant must be in 0..8");
        self.children[octant] = Some(child.into());
        self.is_leaf = false;
        self
    }

    /// Ids of the children that are present.
    pub fn child_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.children.iter().flatten()
    }

    pub fn should_subdivide(&self, threshold: f64) -> bool {
        !self.is_leaf && self.homogeneity < threshold
    }

    pub fn can_compress(&self, threshold: f64) -> bool {
        self.homogeneity >= threshold
    }

    /// Refresh `last_modified` to the current wall-clock time.
    pub fn touch(&mut self) {
        self.last_modified = SystemTime::now();
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.id.is_empty() {
            return Err(NodeError::EmptyId);
        }
        if !(0.0..=1.0).contains(&self.homogeneity) {
            return Err(NodeError::Homogeneity(self.homogeneity));
        }
        self.bounds.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> SpatialBounds {
        SpatialBounds::from_extents(0.0, 0.0, 0.0, 100.0, 100.0, 100.0).unwrap()
    }

    #[test]
    fn new_node_starts_at_version_zero() {
        let node = OctreeNode::new("n", 3, 17, bounds());
        assert_eq!(node.version, 0);
        assert!(node.is_leaf);
        assert_eq!(node.child_ids().count(), 0);
        assert!(node.parent.is_none());
    }

    #[test]
    fn subdivide_only_heterogeneous_inner_nodes() {
        let leaf = OctreeNode::new("leaf", 1, 0, bounds()).with_homogeneity(0.5);
        assert!(!leaf.should_subdivide(0.9));

        let inner = OctreeNode::new("inner", 1, 0, bounds())
            .with_child(0, "c0")
            .with_homogeneity(0.5);
        assert!(inner.should_subdivide(0.9));
        assert!(!inner.with_homogeneity(0.95).should_subdivide(0.9));
    }

    #[test]
    fn compress_at_or_above_threshold() {
        let node = OctreeNode::new("n", 1, 0, bounds()).with_homogeneity(0.9);
        assert!(node.can_compress(0.9));
        assert!(!node.can_compress(0.91));
    }

    #[test]
    fn children_are_references_by_id() {
        let node = OctreeNode::new("p", 2, 0, bounds())
            .with_child(0, "c0")
            .with_child(7, "c7");
        let ids: Vec<&str> = node.child_ids().map(NodeId::as_str).collect();
        assert_eq!(ids, vec!["c0", "c7"]);
        assert!(!node.is_leaf);
    }

    #[test]
    #[should_panic(expected = "octant must be in 0..8")]
    fn ninth_child_panics() {
        let _ = OctreeNode::new("p", 2, 0, bounds()).with_child(8, "c8");
    }

    #[test]
    fn validate_rejects_bad_input() {
        let empty = OctreeNode::new("", 0, 0, bounds());
        assert_eq!(empty.validate(), Err(NodeError::EmptyId));

        let heavy = OctreeNode::new("n", 0, 0, bounds()).with_homogeneity(1.5);
        assert_eq!(heavy.validate(), Err(NodeError::Homogeneity(1.5)));

        let mut inverted = OctreeNode::new("n", 0, 0, bounds());
        inverted.bounds.min.x = 200.0;
        assert!(matches!(inverted.validate(), Err(NodeError::Bounds(_))));
    }

    #[test]
    fn touch_moves_timestamp_forward() {
        let mut node = OctreeNode::new("n", 0, 0, bounds());
        node.last_modified = SystemTime::UNIX_EPOCH;
        node.touch();
        assert!(node.last_modified > SystemTime::UNIX_EPOCH);
    }
}
