//! Read side of one field index: key -> record offsets.

use std::path::Path;

use tracing::{debug, warn};

use crate::concurrency::LockManager;
use crate::config::IndexPaths;
use crate::error::{IndexError, Result};
use crate::hash::{bucket_of, normalize};
use crate::storage::buckets::BucketTable;
use crate::storage::node_log::{Node, NodeLog};
use crate::storage::EMPTY_CHAIN;
use crate::types::{Field, MatchMode, RecordOffset};

/// Open bucket table + node log for one field, with the bucket count and
/// hash seed cached from the table header.
pub struct FieldIndex {
    table: BucketTable,
    log: NodeLog,
    num_buckets: u64,
    hash_seed: u64,
    match_mode: MatchMode,
    lock: LockManager,
}

/// Shape of an index's chains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub num_buckets: u64,
    pub occupied_buckets: u64,
    pub total_nodes: u64,
    pub longest_chain: u64,
    pub log_bytes: u64,
}

impl FieldIndex {
    /// Open `<dir>/<field>_buckets.dat` and `<dir>/<field>_arrays.dat`.
    pub fn open(dir: &Path, field: Field) -> Result<Self> {
        Self::open_paths(&IndexPaths::new(dir, field))
    }

    pub fn open_paths(paths: &IndexPaths) -> Result<Self> {
        let table = BucketTable::open_read_only(&paths.buckets)?;
        let log = NodeLog::open_read_only(&paths.arrays)?;
        let lock = LockManager::new(&paths.lock)?;
        let num_buckets = table.num_buckets();
        let hash_seed = table.hash_seed();

        debug!(
            buckets = %paths.buckets.display(),
            num_buckets,
            hash_seed,
            log_bytes = log.len(),
            "opened index"
        );
        Ok(FieldIndex {
            table,
            log,
            num_buckets,
            hash_seed,
            match_mode: MatchMode::Exact,
            lock,
        })
    }

    /// Use `mode` for subsequent `lookup` calls.
    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    pub fn num_buckets(&self) -> u64 {
        self.num_buckets
    }

    pub fn hash_seed(&self) -> u64 {
        self.hash_seed
    }

    pub fn match_mode(&self) -> MatchMode {
        self.match_mode
    }

    /// Bucket `key` hashes to in this index.
    pub fn bucket_of<K: AsRef<[u8]> + ?Sized>(&self, key: &K) -> u64 {
        bucket_of(key, self.hash_seed, self.num_buckets)
    }

    /// Record offsets stored under `key`, newest row first. An unknown key
    /// yields an empty vector. Exact matching compares raw key bytes.
    pub fn lookup<K: AsRef<[u8]> + ?Sized>(&self, key: &K) -> Result<Vec<RecordOffset>> {
        self.lookup_with(key, self.match_mode)
    }

    pub fn lookup_with<K: AsRef<[u8]> + ?Sized>(
        &self,
        key: &K,
        mode: MatchMode,
    ) -> Result<Vec<RecordOffset>> {
        let _guard = self.lock.read_lock()?;
        let key = key.as_ref();

        let bucket_id = self.bucket_of(key);
        let wanted = match mode {
            MatchMode::Exact => None,
            MatchMode::Normalized => Some(normalize(key)),
        };

        let mut results = Vec::new();
        for item in self.chain(bucket_id)? {
            let (node_off, node) = match item {
                Ok(item) => item,
                Err(e) => {
                    // Whatever was collected so far is still returned.
                    warn!(bucket_id, error = %e, "chain walk stopped early");
                    break;
                }
            };
            let hit = match &wanted {
                None => node.key == key,
                Some(norm) => normalize(&node.key) == *norm,
            };
            if hit {
                debug!(bucket_id, node_off, n = node.offsets.len(), "key matched");
                results.extend_from_slice(&node.offsets);
            }
        }
        Ok(results)
    }

    /// Walk the chain of `bucket_id` from its head.
    pub fn chain(&self, bucket_id: u64) -> Result<Chain<'_>> {
        let head = self.table.read_head(bucket_id)?;
        Ok(Chain {
            log: &self.log,
            cur: head,
            done: false,
        })
    }

    /// Walk every chain. Chains that end in a read failure are counted up to
    /// the failure.
    pub fn stats(&self) -> Result<IndexStats> {
        let _guard = self.lock.read_lock()?;

        let mut stats = IndexStats {
            num_buckets: self.num_buckets,
            log_bytes: self.log.len(),
            ..IndexStats::default()
        };
        for bucket_id in 0..self.num_buckets {
            let len = self.chain(bucket_id)?.take_while(|r| r.is_ok()).count() as u64;
            if len > 0 {
                stats.occupied_buckets += 1;
                stats.total_nodes += len;
                stats.longest_chain = stats.longest_chain.max(len);
            }
        }
        Ok(stats)
    }

    /// Release both files.
    pub fn close(self) {}
}

/// Iterator over `(node_offset, node)` along one chain.
///
/// Nodes are only ever linked to earlier nodes, so each `next_ptr` must be
/// strictly below the offset of the node holding it. A pointer that is not
/// ends the walk with a format error instead of looping.
pub struct Chain<'a> {
    log: &'a NodeLog,
    cur: u64,
    done: bool,
}

impl Iterator for Chain<'_> {
    type Item = Result<(u64, Node)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cur == EMPTY_CHAIN {
            return None;
        }
        let node_off = self.cur;
        match self.log.read_node(node_off) {
            Ok(node) => {
                if node.next_ptr != EMPTY_CHAIN && node.next_ptr >= node_off {
                    self.done = true;
                    return Some(Err(IndexError::Format(format!(
                        "node at {} links forward to {}",
                        node_off, node.next_ptr
                    ))));
                }
                self.cur = node.next_ptr;
                Some(Ok((node_off, node)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
