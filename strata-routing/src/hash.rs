//! Hash functions used for routing.

use xxhash_rust::xxh64::xxh64;

/// Multiplier of the jump consistent hash linear congruential generator.
const JUMP_LCG_MULTIPLIER: u64 = 2_862_933_555_777_941_757;

/// xxHash-64 with seed 0.
///
/// Namespace and topic ids are the `xxhash64` of their names.
#[must_use]
pub fn xxhash64(bytes: &[u8]) -> u64 {
    xxh64(bytes, 0)
}

/// Maps `key` to a bucket in `[0, buckets)` (Lamping & Veach).
///
/// Growing from `n` to `n + 1` buckets moves only about `1 / (n + 1)` of the
/// keys, and every moved key lands in the new bucket.
///
/// # Panics
/// Panics if `buckets` is zero.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]
pub fn jump_consistent_hash(mut key: u64, buckets: u32) -> u32 {
    assert!(buckets > 0, "jump consistent hash needs at least one bucket");

    let mut b: i64 = -1;
    let mut j: i64 = 0;
    while j < i64::from(buckets) {
        b = j;
        key = key.wrapping_mul(JUMP_LCG_MULTIPLIER).wrapping_add(1);
        j = ((b + 1) as f64 * ((1u64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }
    b as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_xxhash64_is_seed_zero() {
        assert_eq!(xxhash64(b"orders"), xxh64(b"orders", 0));
        assert_ne!(xxhash64(b"orders"), xxhash64(b"payments"));
    }

    #[test]
    fn test_single_bucket() {
        for key in [0, 1, 42, u64::MAX] {
            assert_eq!(jump_consistent_hash(key, 1), 0);
        }
    }

    #[test]
    fn test_deterministic_and_in_range() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..10_000 {
            let key: u64 = rng.gen();
            let buckets = rng.gen_range(1..=1024);
            let bucket = jump_consistent_hash(key, buckets);
            assert!(bucket < buckets);
            assert_eq!(bucket, jump_consistent_hash(key, buckets));
        }
    }

    #[test]
    fn test_minimal_remapping() {
        let mut rng = StdRng::seed_from_u64(7);
        let keys: Vec<u64> = (0..100_000).map(|_| rng.gen()).collect();

        for n in [1u32, 4, 8, 31] {
            let mut moved = 0usize;
            for &key in &keys {
                let before = jump_consistent_hash(key, n);
                let after = jump_consistent_hash(key, n + 1);
                if before != after {
                    // Keys only ever move into the new bucket.
                    assert_eq!(after, n);
                    moved += 1;
                }
            }
            let fraction = moved as f64 / keys.len() as f64;
            let expected = 1.0 / f64::from(n + 1);
            assert!(
                fraction <= expected + 0.01,
                "n={n}: moved {fraction:.4}, expected about {expected:.4}"
            );
        }
    }

    #[test]
    fn test_balanced_distribution() {
        let buckets = 16u32;
        let mut counts = vec![0u32; buckets as usize];
        for key in 0..160_000u64 {
            counts[jump_consistent_hash(xxhash64(&key.to_le_bytes()), buckets) as usize] += 1;
        }
        for count in counts {
            assert!((8_000..12_000).contains(&count), "unbalanced bucket: {count}");
        }
    }

    #[test]
    #[should_panic(expected = "at least one bucket")]
    fn test_zero_buckets_panics() {
        let _ = jump_consistent_hash(1, 0);
    }
}
