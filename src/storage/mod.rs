pub mod buckets;
pub mod codec;
pub mod io;
pub mod node_log;

/// Offset value meaning "no node": an empty bucket, or the end of a chain.
pub const EMPTY_CHAIN: u64 = 0;
