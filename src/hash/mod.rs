//! Seeded key fingerprint and bucket selection.
//!
//! The hash is FNV-1a over at most the first `HASH_KEY_PREFIX_LEN` bytes of
//! the normalized key, with the seed XOR-ed into the offset basis, followed by
//! a three-round xor-shift/multiply finalizer. The seed lives in the bucket
//! table header, so readers always hash with the seed the index was built with.

pub mod normalize;

pub use normalize::{normalize, normalize_opt};

/// Only this many bytes of the normalized key are hashed.
pub const HASH_KEY_PREFIX_LEN: usize = 20;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Seed used when the caller does not choose one.
pub const DEFAULT_HASH_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Hash raw bytes (already normalized), honouring the prefix bound.
pub fn hash_prefix(bytes: &[u8], seed: u64) -> u64 {
    let prefix = &bytes[..bytes.len().min(HASH_KEY_PREFIX_LEN)];

    let mut h = FNV_OFFSET_BASIS ^ seed;
    for &b in prefix {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }

    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}

/// Normalize `key` and hash it. Keys are raw bytes; they need not be UTF-8.
pub fn hash_key<K: AsRef<[u8]> + ?Sized>(key: &K, seed: u64) -> u64 {
    hash_prefix(normalize(key).as_bytes(), seed)
}

/// Bucket for `hash` in a table of `num_buckets` (a power of two).
pub fn bucket_for(hash: u64, num_buckets: u64) -> u64 {
    debug_assert!(num_buckets.is_power_of_two());
    hash & (num_buckets - 1)
}

/// Bucket for `key` under `seed` in a table of `num_buckets`.
pub fn bucket_of<K: AsRef<[u8]> + ?Sized>(key: &K, seed: u64, num_buckets: u64) -> u64 {
    bucket_for(hash_key(key, seed), num_buckets)
}

/// Smallest power of two >= `v`. Zero rounds to 1; values above 2^63 clamp to 2^63.
pub fn next_pow2(v: u64) -> u64 {
    v.max(1).checked_next_power_of_two().unwrap_or(1 << 63)
}
