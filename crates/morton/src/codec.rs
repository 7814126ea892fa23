use glam::{DVec3, UVec3};
use octastore_common::{BoundsError, NodeId, OctreeNode, SpatialBounds};

use crate::hash::Placement;
use crate::key::{SpatialHashKey, cache_key, region_key};

/// Deepest level with full grid resolution. Each axis gets 21 bits, so a
/// Morton code fits in 63 bits. Deeper levels are quantized as level 21.
pub const MAX_LEVEL: u32 = 21;

const AXIS_MASK: u64 = 0x1f_ffff;

/// Interleave three 21-bit grid coordinates: bit `i` of x lands on bit `3i`,
/// y on `3i + 1`, z on `3i + 2`. Bits above 21 are dropped.
pub fn interleave(x: u32, y: u32, z: u32) -> u64 {
    spread(x) | (spread(y) << 1) | (spread(z) << 2)
}

/// Exact inverse of [`interleave`].
pub fn deinterleave(code: u64) -> (u32, u32, u32) {
    (compact(code), compact(code >> 1), compact(code >> 2))
}

fn spread(v: u32) -> u64 {
    let mut x = v as u64 & AXIS_MASK;
    x = (x | x << 32) & 0x001f_0000_0000_ffff;
    x = (x | x << 16) & 0x001f_0000_ff00_00ff;
    x = (x | x << 8) & 0x100f_00f0_0f00_f00f;
    x = (x | x << 4) & 0x10c3_0c30_c30c_30c3;
    x = (x | x << 2) & 0x1249_2492_4924_9249;
    x
}

fn compact(v: u64) -> u32 {
    let mut x = v & 0x1249_2492_4924_9249;
    x = (x ^ (x >> 2)) & 0x10c3_0c30_c30c_30c3;
    x = (x ^ (x >> 4)) & 0x100f_00f0_0f00_f00f;
    x = (x ^ (x >> 8)) & 0x001f_0000_ff00_00ff;
    x = (x ^ (x >> 16)) & 0x001f_0000_0000_ffff;
    x = (x ^ (x >> 32)) & AXIS_MASK;
    x as u32
}

/// Maps world positions to per-level Morton codes relative to fixed world bounds.
#[derive(Debug, Clone)]
pub struct MortonCodec {
    world: SpatialBounds,
    replication_factor: u32,
}

impl MortonCodec {
    /// World bounds must have a positive extent on every axis.
    pub fn new(world_bounds: SpatialBounds, replication_factor: u32) -> Result<Self, BoundsError> {
        world_bounds.validate_volume()?;
        Ok(Self {
            world: world_bounds,
            replication_factor,
        })
    }

    pub fn world_bounds(&self) -> &SpatialBounds {
        &self.world
    }

    pub fn replication_factor(&self) -> u32 {
        self.replication_factor
    }

    /// Integer cell of `point` in the `2^level` grid, clamped into the grid.
    pub fn grid_cell(&self, point: DVec3, level: u32) -> UVec3 {
        let resolution = resolution(level);
        let max_cell = (resolution - 1) as f64;
        let normalized = (point - self.world.min) / self.world.size() * resolution as f64;
        // NaN falls through clamp and saturates to 0 in the cast.
        let quantize = |v: f64| v.floor().clamp(0.0, max_cell) as u32;
        UVec3::new(
            quantize(normalized.x),
            quantize(normalized.y),
            quantize(normalized.z),
        )
    }

    pub fn encode(&self, point: DVec3, level: u32) -> u64 {
        let cell = self.grid_cell(point, level);
        interleave(cell.x, cell.y, cell.z)
    }

    /// Grid coordinates of a code. The level is implied by the caller.
    pub fn decode(&self, code: u64) -> UVec3 {
        let (x, y, z) = deinterleave(code);
        UVec3::new(x, y, z)
    }

    /// World-space box covered by `code` at `level`.
    pub fn cell_bounds(&self, code: u64, level: u32) -> SpatialBounds {
        let cell_size = self.world.size() / resolution(level) as f64;
        let cell = self.decode(code).as_dvec3();
        let min = self.world.min + cell * cell_size;
        SpatialBounds {
            min,
            max: min + cell_size,
        }
    }

    pub fn placement(&self, code: u64, level: u32) -> Placement {
        Placement::for_region(&region_key(level, code), self.replication_factor)
    }

    pub fn key_for(&self, code: u64, level: u32) -> SpatialHashKey {
        let region_key = region_key(level, code);
        SpatialHashKey {
            level,
            morton_code: code,
            placement: Placement::for_region(&region_key, self.replication_factor),
            region_key,
            cache_key: cache_key(level, code),
            region: self.cell_bounds(code, level),
        }
    }

    /// Keys for every level from the root down to `max_level`, root first.
    pub fn hierarchical_keys(&self, point: DVec3, max_level: u32) -> Vec<SpatialHashKey> {
        (0..=max_level)
            .map(|level| self.key_for(self.encode(point, level), level))
            .collect()
    }

    /// A node for the cell containing `point`, with code and bounds consistent
    /// with this codec.
    pub fn node_at(&self, id: impl Into<NodeId>, point: DVec3, level: u32) -> OctreeNode {
        let code = self.encode(point, level);
        OctreeNode::new(id, level, code, self.cell_bounds(code, level))
    }
}

fn resolution(level: u32) -> u32 {
    1 << level.min(MAX_LEVEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> MortonCodec {
        let world = SpatialBounds::from_extents(0.0, 0.0, 0.0, 1000.0, 1000.0, 1000.0).unwrap();
        MortonCodec::new(world, 3).unwrap()
    }

    #[test]
    fn interleave_places_bits_by_axis() {
        assert_eq!(interleave(1, 0, 0), 0b001);
        assert_eq!(interleave(0, 1, 0), 0b010);
        assert_eq!(interleave(0, 0, 1), 0b100);
        assert_eq!(interleave(1, 2, 3), 53);
        assert_eq!(deinterleave(53), (1, 2, 3));
    }

    #[test]
    fn interleave_uses_full_63_bits() {
        let max = (1u32 << 21) - 1;
        let code = interleave(max, max, max);
        assert_eq!(code, (1u64 << 63) - 1);
        assert_eq!(deinterleave(code), (max, max, max));
    }

    #[test]
    fn origin_encodes_to_zero() {
        assert_eq!(codec().encode(DVec3::ZERO, 0), 0);
        assert_eq!(codec().encode(DVec3::ZERO, 10), 0);
    }

    #[test]
    fn world_corners_differ() {
        let c = codec();
        assert_ne!(
            c.encode(DVec3::ZERO, 5),
            c.encode(DVec3::splat(1000.0), 5)
        );
    }

    #[test]
    fn out_of_world_points_clamp_into_grid() {
        let c = codec();
        assert_eq!(c.grid_cell(DVec3::splat(-50.0), 4), UVec3::ZERO);
        assert_eq!(c.grid_cell(DVec3::splat(5000.0), 4), UVec3::splat(15));
        assert_eq!(c.grid_cell(DVec3::splat(f64::NAN), 4), UVec3::ZERO);
    }

    #[test]
    fn decode_never_exceeds_normalized_input() {
        let c = codec();
        let points = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(15.0, 23.0, 8.0),
            DVec3::new(123.4, 567.8, 901.2),
            DVec3::new(450.0, 450.0, 450.0),
            DVec3::new(999.999, 0.001, 500.0),
            DVec3::new(1000.0, 1000.0, 1000.0),
        ];
        for level in 0..=MAX_LEVEL {
            let res = (1u64 << level) as f64;
            for p in points {
                let cell = c.decode(c.encode(p, level)).as_dvec3();
                let normalized = p / 1000.0 * res;
                assert!(
                    cell.cmple(normalized).all(),
                    "level {level}: {cell:?} > {normalized:?}"
                );
            }
        }
    }

    #[test]
    fn codes_non_decreasing_along_x() {
        let c = codec();
        for level in [1, 5, 10, 21] {
            let mut last = 0;
            for i in 0..=200 {
                let code = c.encode(DVec3::new(i as f64 * 5.0, 100.0, 100.0), level);
                assert!(code >= last, "level {level}: code decreased at x={}", i * 5);
                last = code;
            }
        }
        let a = c.encode(DVec3::new(100.0, 100.0, 100.0), 5);
        let b = c.encode(DVec3::new(200.0, 100.0, 100.0), 5);
        let d = c.encode(DVec3::new(300.0, 100.0, 100.0), 5);
        assert!(a < b && b < d);
    }

    #[test]
    fn levels_past_cap_quantize_as_max_level() {
        let c = codec();
        let p = DVec3::new(321.0, 654.0, 987.0);
        assert_eq!(c.encode(p, MAX_LEVEL + 3), c.encode(p, MAX_LEVEL));
    }

    #[test]
    fn hierarchical_keys_root_first() {
        let keys = codec().hierarchical_keys(DVec3::splat(500.0), 5);
        assert_eq!(keys.len(), 6);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(key.level, i as u32);
            assert!(key.cache_key.starts_with("octree:"));
            assert!(key.cache_key.contains(&format!("{:02}", key.level)));
            assert_eq!(key.replica_hashes().len(), 2);
        }
    }

    #[test]
    fn key_regions_contain_the_point() {
        let c = codec();
        for p in [DVec3::splat(500.0), DVec3::new(450.0, 120.0, 880.0)] {
            for key in c.hierarchical_keys(p, 8) {
                assert!(key.region.contains(p), "level {} misses {p:?}", key.level);
            }
        }
    }

    #[test]
    fn cell_bounds_nest_across_levels() {
        let c = codec();
        let keys = c.hierarchical_keys(DVec3::new(450.0, 450.0, 450.0), 6);
        for pair in keys.windows(2) {
            let (coarse, fine) = (&pair[0].region, &pair[1].region);
            assert!(coarse.contains(fine.min) && coarse.contains(fine.max));
        }
    }

    #[test]
    fn node_at_is_self_consistent() {
        let c = codec();
        let node = c.node_at("A", DVec3::splat(450.0), 5);
        assert_eq!(node.morton_code, c.encode(DVec3::splat(450.0), 5));
        assert_eq!(c.encode(node.bounds.center(), 5), node.morton_code);
        assert!(node.bounds.contains(DVec3::splat(450.0)));
    }

    #[test]
    fn degenerate_world_is_rejected() {
        let flat = SpatialBounds::from_extents(0.0, 0.0, 0.0, 10.0, 0.0, 10.0).unwrap();
        assert!(MortonCodec::new(flat, 3).is_err());
    }
}
