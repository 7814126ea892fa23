//! Shared types for the octastore spatial storage engine.
//!
//! # Invariants
//! - `SpatialBounds` handed to the engine satisfy `min <= max` on every axis.
//! - An `OctreeNode` never owns its children; it refers to them by `NodeId`.

mod bounds;
mod node;
mod types;

pub use bounds::{Axis, BoundsError, SpatialBounds};
pub use node::{MaterialId, NodeError, OctreeNode, OCTANTS};
pub use types::{CancellationToken, ConsistencyLevel, NodeId};

pub fn crate_info() -> &'static str {
    "octastore-common v0.1.0"
}
