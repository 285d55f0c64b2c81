//! Streaming index construction.
//!
//! Each data row of the source contributes one node to the chain of the
//! bucket its key hashes to. The new node links to the bucket's current head
//! and then becomes the head, so a chain lists its rows newest-first.

pub mod csv;
pub mod source;

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::concurrency::LockManager;
use crate::config::{IndexConfig, IndexPaths};
use crate::error::{IndexError, Result};
use crate::hash::{bucket_of, next_pow2};
use crate::storage::buckets::BucketTable;
use crate::storage::node_log::NodeLog;
use crate::types::{Field, RecordOffset};

use self::source::SourceReader;

/// Row counts from one build pass. The header row is not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub rows_seen: u64,
    pub rows_indexed: u64,
    /// Rows whose field was missing or empty after trimming.
    pub rows_skipped: u64,
    /// Rows whose node could not be appended or linked.
    pub rows_failed: u64,
}

/// Result of building both field indexes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub title: BuildStats,
    pub author: BuildStats,
}

/// Writer over a freshly created bucket table and node log.
pub struct Builder {
    table: BucketTable,
    log: NodeLog,
    num_buckets: u64,
    hash_seed: u64,
}

impl Builder {
    /// Create both files from scratch, overwriting any previous index.
    /// `num_buckets` is rounded up to the next power of two.
    pub fn create(paths: &IndexPaths, num_buckets: u64, hash_seed: u64) -> Result<Self> {
        let num_buckets = next_pow2(num_buckets);
        let table = BucketTable::create(&paths.buckets, num_buckets, hash_seed)?;
        let log = NodeLog::create(&paths.arrays)?;
        Ok(Builder {
            table,
            log,
            num_buckets,
            hash_seed,
        })
    }

    pub fn num_buckets(&self) -> u64 {
        self.num_buckets
    }

    pub fn hash_seed(&self) -> u64 {
        self.hash_seed
    }

    /// Prepend a node for `key` to its bucket's chain. Returns the node offset.
    pub fn insert<K: AsRef<[u8]> + ?Sized>(
        &mut self,
        key: &K,
        record_offset: RecordOffset,
    ) -> Result<u64> {
        self.insert_many(key, &[record_offset])
    }

    /// Prepend one node carrying several record offsets.
    ///
    /// The node is appended before the bucket head is rewritten; if the append
    /// fails the chain is left untouched.
    pub fn insert_many<K: AsRef<[u8]> + ?Sized>(
        &mut self,
        key: &K,
        offsets: &[RecordOffset],
    ) -> Result<u64> {
        let bucket_id = bucket_of(key, self.hash_seed, self.num_buckets);
        let old_head = self.table.read_head(bucket_id)?;
        let node_off = self.log.append(key, offsets, old_head)?;
        self.table.write_head(bucket_id, node_off)?;
        Ok(node_off)
    }

    /// Index every data row of `reader` on `field`. The first line is the
    /// header row and is skipped; a source without one is an error.
    ///
    /// Rows with a missing or empty field are skipped, and rows whose insert
    /// fails are logged and skipped. Only errors reading the source abort.
    pub fn ingest<R: BufRead>(&mut self, reader: R, field: Field) -> Result<BuildStats> {
        let mut source = SourceReader::new(reader);
        if source.next_line()?.is_none() {
            return Err(IndexError::Source("source has no header row".to_string()));
        }

        let mut stats = BuildStats::default();
        while let Some(line) = source.next_line()? {
            stats.rows_seen += 1;

            let key = match csv::field(&line.bytes, field.column()) {
                Some(key) if !key.is_empty() => key,
                Some(_) => {
                    stats.rows_skipped += 1;
                    continue;
                }
                None => {
                    debug!(offset = line.offset, %field, "row has no such column, skipping");
                    stats.rows_skipped += 1;
                    continue;
                }
            };

            match self.insert(&key, line.offset) {
                Ok(_) => stats.rows_indexed += 1,
                Err(e) => {
                    warn!(offset = line.offset, %field, error = %e, "failed to index row");
                    stats.rows_failed += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Flush both files to disk.
    pub fn finish(self) -> Result<()> {
        self.log.sync()?;
        self.table.sync()?;
        Ok(())
    }
}

/// Build (or rebuild) one field's index under `dir` from the source at `source_path`.
pub fn build_index(
    source_path: &Path,
    dir: &Path,
    field: Field,
    num_buckets: u64,
    hash_seed: u64,
) -> Result<BuildStats> {
    let paths = IndexPaths::new(dir, field);
    let lock = LockManager::new(&paths.lock)?;
    let _guard = lock.write_lock()?;

    let source = File::open(source_path)?;
    let mut builder = Builder::create(&paths, num_buckets, hash_seed)?;
    let stats = builder.ingest(BufReader::new(source), field)?;
    let num_buckets = builder.num_buckets();
    builder.finish()?;

    info!(
        %field,
        num_buckets,
        rows = stats.rows_seen,
        indexed = stats.rows_indexed,
        skipped = stats.rows_skipped,
        failed = stats.rows_failed,
        "index built"
    );
    Ok(stats)
}

/// Build the title and author indexes, one full pass each.
pub fn build_all(source_path: &Path, dir: &Path, config: &IndexConfig) -> Result<BuildReport> {
    fs::create_dir_all(dir)?;
    let config = config.normalized();
    let title = build_index(
        source_path,
        dir,
        Field::Title,
        config.title_buckets,
        config.hash_seed,
    )?;
    let author = build_index(
        source_path,
        dir,
        Field::Author,
        config.author_buckets,
        config.hash_seed,
    )?;
    Ok(BuildReport { title, author })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::EMPTY_CHAIN;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn read_chain(paths: &IndexPaths, bucket_id: u64) -> Vec<(Vec<u8>, Vec<u64>)> {
        let table = BucketTable::open_read_only(&paths.buckets).unwrap();
        let log = NodeLog::open_read_only(&paths.arrays).unwrap();
        let mut out = Vec::new();
        let mut cur = table.read_head(bucket_id).unwrap();
        while cur != EMPTY_CHAIN {
            let node = log.read_node(cur).unwrap();
            out.push((node.key, node.offsets));
            cur = node.next_ptr;
        }
        out
    }

    #[test]
    fn test_bucket_count_rounded_up() {
        let dir = TempDir::new().unwrap();
        let paths = IndexPaths::new(dir.path(), Field::Title);

        let builder = Builder::create(&paths, 4096, 1).unwrap();
        assert_eq!(builder.num_buckets(), 4096);
        drop(builder);

        let builder = Builder::create(&paths, 3000, 1).unwrap();
        assert_eq!(builder.num_buckets(), 4096);
        drop(builder);
        assert_eq!(BucketTable::open(&paths.buckets).unwrap().num_buckets(), 4096);
    }

    #[test]
    fn test_chain_is_lifo() {
        let dir = TempDir::new().unwrap();
        let paths = IndexPaths::new(dir.path(), Field::Title);
        // One bucket: every key shares a chain.
        let mut builder = Builder::create(&paths, 1, 5).unwrap();
        builder.insert("r1", 100).unwrap();
        builder.insert("r2", 200).unwrap();
        builder.insert("r3", 300).unwrap();
        builder.finish().unwrap();

        let chain = read_chain(&paths, 0);
        assert_eq!(
            chain,
            vec![
                (b"r3".to_vec(), vec![300]),
                (b"r2".to_vec(), vec![200]),
                (b"r1".to_vec(), vec![100]),
            ]
        );
    }

    #[test]
    fn test_ingest_counts_and_skips() {
        let dir = TempDir::new().unwrap();
        let paths = IndexPaths::new(dir.path(), Field::Author);
        let data = "title,author_name\n\
                    Dune,Frank Herbert\n\
                    Untitled,   \n\
                    no-author-column\n\
                    \"Quoted, Title\",\"Le Guin, Ursula\"\n";

        let mut builder = Builder::create(&paths, 8, 5).unwrap();
        let stats = builder.ingest(Cursor::new(data), Field::Author).unwrap();
        builder.finish().unwrap();

        assert_eq!(
            stats,
            BuildStats {
                rows_seen: 4,
                rows_indexed: 2,
                rows_skipped: 2,
                rows_failed: 0,
            }
        );

        let bucket = bucket_of("Le Guin, Ursula", 5, 8);
        let chain = read_chain(&paths, bucket);
        assert!(chain.iter().any(|(k, _)| k == b"Le Guin, Ursula"));
    }

    #[test]
    fn test_ingest_keeps_raw_key() {
        let dir = TempDir::new().unwrap();
        let paths = IndexPaths::new(dir.path(), Field::Title);
        let data = "Title,Author\n  The HOBBIT!  ,Tolkien\n";

        let mut builder = Builder::create(&paths, 4, 5).unwrap();
        builder.ingest(Cursor::new(data), Field::Title).unwrap();
        builder.finish().unwrap();

        let chain = read_chain(&paths, bucket_of("the hobbit", 5, 4));
        assert_eq!(chain, vec![(b"The HOBBIT!".to_vec(), vec![13])]);
    }

    #[test]
    fn test_ingest_stores_non_utf8_key_bytes() {
        let dir = TempDir::new().unwrap();
        let paths = IndexPaths::new(dir.path(), Field::Title);
        let data = b"Title,Author\nCaf\xe9,Ann\n".to_vec();

        let mut builder = Builder::create(&paths, 4, 5).unwrap();
        let stats = builder.ingest(Cursor::new(data), Field::Title).unwrap();
        builder.finish().unwrap();
        assert_eq!(stats.rows_indexed, 1);

        let chain = read_chain(&paths, bucket_of(&b"Caf\xe9"[..], 5, 4));
        assert_eq!(chain, vec![(b"Caf\xe9".to_vec(), vec![13])]);
        // key_len 4, then the raw bytes; no replacement character.
        let raw = std::fs::read(&paths.arrays).unwrap();
        assert_eq!(&raw[4096..4102], &[4, 0, b'C', b'a', b'f', 0xe9]);
    }

    #[test]
    fn test_repeated_key_gets_one_node_per_row() {
        let dir = TempDir::new().unwrap();
        let paths = IndexPaths::new(dir.path(), Field::Title);
        let data = "Title,Author\nAlpha,Ann\nAlpha,Bob\n";

        let mut builder = Builder::create(&paths, 4, 5).unwrap();
        builder.ingest(Cursor::new(data), Field::Title).unwrap();
        builder.finish().unwrap();

        let chain = read_chain(&paths, bucket_of("Alpha", 5, 4));
        assert_eq!(
            chain,
            vec![(b"Alpha".to_vec(), vec![23]), (b"Alpha".to_vec(), vec![13])]
        );
    }

    #[test]
    fn test_missing_header_is_error() {
        let dir = TempDir::new().unwrap();
        let paths = IndexPaths::new(dir.path(), Field::Title);
        let mut builder = Builder::create(&paths, 4, 5).unwrap();
        assert!(matches!(
            builder.ingest(Cursor::new(""), Field::Title),
            Err(IndexError::Source(_))
        ));
    }

    #[test]
    fn test_oversized_key_counted_as_failed() {
        let dir = TempDir::new().unwrap();
        let paths = IndexPaths::new(dir.path(), Field::Title);
        let long = "x".repeat(70_000);
        let data = format!("Title,Author\n{},Ann\nShort,Bob\n", long);

        let mut builder = Builder::create(&paths, 4, 5).unwrap();
        let stats = builder.ingest(Cursor::new(data), Field::Title).unwrap();
        assert_eq!(stats.rows_failed, 1);
        assert_eq!(stats.rows_indexed, 1);
    }
}
