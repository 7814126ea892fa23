use serde::{Deserialize, Serialize};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;
const JUMP_MULTIPLIER: u64 = 2_862_933_555_777_941_757;

/// 64-bit FNV-1a, one xor-then-multiply step per input byte.
pub fn fnv1a(data: &str) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in data.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Lamping-Veach jump consistent hash. Returns a bucket in `[0, num_buckets)`.
///
/// Growing `num_buckets` by one moves a key only into the new bucket, never
/// between existing ones.
///
/// # Panics
///
/// Panics if `num_buckets` is 0.
pub fn jump_consistent_hash(mut key: u64, num_buckets: u32) -> u32 {
    assert!(num_buckets > 0, "num_buckets must be positive");
    let mut b: i64 = -1;
    let mut j: i64 = 0;
    while j < num_buckets as i64 {
        b = j;
        key = key.wrapping_mul(JUMP_MULTIPLIER).wrapping_add(1);
        j = ((b + 1) as f64 * ((1u64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }
    b as u32
}

/// Primary and replica hashes for one region key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub primary: u64,
    /// `replication_factor - 1` hashes, one per extra replica.
    pub replicas: Vec<u64>,
}

impl Placement {
    pub fn for_region(region_key: &str, replication_factor: u32) -> Self {
        let replicas = (1..replication_factor)
            .map(|i| fnv1a(&format!("{region_key}:replica{i}")))
            .collect();
        Self {
            primary: fnv1a(region_key),
            replicas,
        }
    }

    /// Server index owning the primary copy among `num_servers` servers.
    ///
    /// # Panics
    ///
    /// Panics if `num_servers` is 0.
    pub fn bucket(&self, num_servers: u32) -> u32 {
        jump_consistent_hash(self.primary, num_servers)
    }

    /// Server indices for the replica copies. Independent per replica, so two
    /// copies may land on the same server. Panics if `num_servers` is 0.
    pub fn replica_buckets(&self, num_servers: u32) -> Vec<u32> {
        self.replicas
            .iter()
            .map(|hash| jump_consistent_hash(*hash, num_servers))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_reference_vectors() {
        assert_eq!(fnv1a(""), 14_695_981_039_346_656_037);
        assert_eq!(fnv1a("a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn jump_hash_is_deterministic_and_in_range() {
        for key in [0u64, 1, 12_345, u64::MAX] {
            let first = jump_consistent_hash(key, 10);
            assert_eq!(first, jump_consistent_hash(key, 10));
            assert!(first < 10);
        }
    }

    #[test]
    fn jump_hash_single_bucket_is_zero() {
        for key in 0..100 {
            assert_eq!(jump_consistent_hash(key, 1), 0);
        }
    }

    #[test]
    fn jump_hash_distributes_evenly() {
        let mut counts = [0u32; 10];
        for key in 0..10_000u64 {
            counts[jump_consistent_hash(key, 10) as usize] += 1;
        }
        for count in counts {
            assert!((800..=1200).contains(&count), "bucket count {count} outside ±20%");
        }
    }

    #[test]
    fn jump_hash_moves_keys_only_into_new_bucket() {
        for key in 0..2_000u64 {
            let before = jump_consistent_hash(key, 7);
            let after = jump_consistent_hash(key, 8);
            assert!(after == before || after == 7);
        }
    }

    #[test]
    #[should_panic(expected = "num_buckets must be positive")]
    fn jump_hash_rejects_zero_buckets() {
        jump_consistent_hash(1, 0);
    }

    #[test]
    fn placement_has_one_hash_per_extra_replica() {
        let placement = Placement::for_region("05:0000000000000123", 3);
        assert_eq!(placement.replicas.len(), 2);
        assert_eq!(placement.primary, fnv1a("05:0000000000000123"));
        assert_eq!(placement.replicas[0], fnv1a("05:0000000000000123:replica1"));
        assert_eq!(placement.replicas[1], fnv1a("05:0000000000000123:replica2"));

        assert!(Placement::for_region("k", 1).replicas.is_empty());
    }

    #[test]
    fn placement_buckets_within_server_count() {
        let placement = Placement::for_region("03:00000000000001FF", 4);
        assert!(placement.bucket(5) < 5);
        let buckets = placement.replica_buckets(5);
        assert_eq!(buckets.len(), 3);
        assert!(buckets.iter().all(|b| *b < 5));
    }
}
