//! Morton codec: maps world positions to per-level Z-order codes.
//!
//! # Invariants
//! - Each axis is quantized to at most 21 bits, so a code fits in 63 bits.
//! - Codes are floor-quantized: decoding never yields a grid cell past the input.
//! - Keys for a point are produced root first (level 0 up to the requested level).
//!
//! # Placement
//! Region keys are hashed with FNV-1a to a primary hash plus one hash per extra
//! replica. Replica hashes are independent per region rather than derived from
//! ring membership, so adding servers does not give minimal-disruption
//! rebalancing. [`jump_consistent_hash`] maps a hash onto a server count.

mod codec;
mod hash;
mod key;

pub use codec::{MAX_LEVEL, MortonCodec, deinterleave, interleave};
pub use hash::{Placement, fnv1a, jump_consistent_hash};
pub use key::{SpatialHashKey, cache_key, region_key};

pub fn crate_info() -> &'static str {
    "octastore-morton v0.1.0"
}
