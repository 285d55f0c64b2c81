use std::fs::{File, OpenOptions};
use std::path::Path;

use tracing::debug;

use crate::error::{IndexError, Result};
use crate::storage::codec::{ByteReader, ByteWriter};
use crate::storage::io::{read_exact_at, write_all_at};

/// Bucket table file header.
/// magic(4) + version(2) + reserved(2) + header_size(4) + num_buckets(8)
/// + hash_seed(8) + entry_size(4), zero-padded to BUCKETS_HEADER_SIZE.
pub const INDEX_MAGIC: &[u8; 4] = b"IDX1";
pub const INDEX_VERSION: u16 = 1;
pub const BUCKETS_HEADER_SIZE: u32 = 4096;
pub const BUCKET_ENTRY_SIZE: u32 = 8;

/// Bytes of the header that carry fields; the rest is padding.
const HEADER_FIELDS_LEN: usize = 32;

/// Zero-fill chunk used when sizing the entry array.
const ZERO_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketHeader {
    pub version: u16,
    pub header_size: u32,
    pub num_buckets: u64,
    pub hash_seed: u64,
    pub entry_size: u32,
}

impl BucketHeader {
    pub fn new(num_buckets: u64, hash_seed: u64) -> Self {
        BucketHeader {
            version: INDEX_VERSION,
            header_size: BUCKETS_HEADER_SIZE,
            num_buckets,
            hash_seed,
            entry_size: BUCKET_ENTRY_SIZE,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(self.header_size as usize);
        w.put_bytes(INDEX_MAGIC);
        w.put_u16(self.version);
        w.put_u16(0); // reserved
        w.put_u32(self.header_size);
        w.put_u64(self.num_buckets);
        w.put_u64(self.hash_seed);
        w.put_u32(self.entry_size);
        w.pad_to(self.header_size as usize);
        w.into_inner()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        let magic = r.get_bytes(4, "bucket header magic")?;
        if magic != INDEX_MAGIC {
            return Err(IndexError::Format(format!(
                "bad bucket table magic {:02x?}, expected {:02x?}",
                magic, INDEX_MAGIC
            )));
        }
        let version = r.get_u16("bucket header version")?;
        if version > INDEX_VERSION {
            return Err(IndexError::Format(format!(
                "unsupported bucket table version {}",
                version
            )));
        }
        let _reserved = r.get_u16("bucket header reserved")?;
        let header_size = r.get_u32("bucket header size")?;
        let num_buckets = r.get_u64("bucket count")?;
        let hash_seed = r.get_u64("hash seed")?;
        let entry_size = r.get_u32("bucket entry size")?;

        if (header_size as usize) < HEADER_FIELDS_LEN {
            return Err(IndexError::Format(format!(
                "bucket header size {} smaller than its fields",
                header_size
            )));
        }
        if entry_size != BUCKET_ENTRY_SIZE {
            return Err(IndexError::Format(format!(
                "unsupported bucket entry size {}",
                entry_size
            )));
        }
        if !num_buckets.is_power_of_two() {
            return Err(IndexError::Format(format!(
                "bucket count {} is not a power of two",
                num_buckets
            )));
        }

        Ok(BucketHeader {
            version,
            header_size,
            num_buckets,
            hash_seed,
            entry_size,
        })
    }
}

/// Fixed-size table of chain heads, one `u64` node-log offset per bucket.
///
/// Entry `i` lives at `header_size + i * entry_size`; `0` marks an empty
/// chain. Head rewrites are single positioned 8-byte writes and are not
/// fsynced.
pub struct BucketTable {
    file: File,
    header: BucketHeader,
}

impl BucketTable {
    /// Create (or truncate) a bucket table with every head empty, synced to disk.
    /// `num_buckets` must already be a power of two.
    pub fn create(path: &Path, num_buckets: u64, hash_seed: u64) -> Result<Self> {
        if !num_buckets.is_power_of_two() {
            return Err(IndexError::Format(format!(
                "bucket count {} is not a power of two",
                num_buckets
            )));
        }
        let entries_len = num_buckets.checked_mul(BUCKET_ENTRY_SIZE as u64).ok_or_else(|| {
            IndexError::Allocation(format!("bucket table of {} entries overflows", num_buckets))
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let header = BucketHeader::new(num_buckets, hash_seed);
        write_all_at(&file, &header.encode(), 0)?;

        let zeros = vec![0u8; ZERO_CHUNK];
        let mut pos = header.header_size as u64;
        let mut remaining = entries_len;
        while remaining > 0 {
            let n = remaining.min(ZERO_CHUNK as u64) as usize;
            write_all_at(&file, &zeros[..n], pos)?;
            pos += n as u64;
            remaining -= n as u64;
        }
        file.sync_all()?;

        debug!(path = %path.display(), num_buckets, hash_seed, "created bucket table");
        Ok(BucketTable { file, header })
    }

    /// Open an existing table for reading and head rewrites.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_file(file)
    }

    /// Open an existing table for lookups only.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_file(file)
    }

    fn from_file(file: File) -> Result<Self> {
        let mut fixed = [0u8; HEADER_FIELDS_LEN];
        read_exact_at(&file, &mut fixed, 0, "bucket table header")?;
        let header = BucketHeader::decode(&fixed)?;

        let expected = (header.header_size as u64)
            .saturating_add(header.num_buckets.saturating_mul(header.entry_size as u64));
        let actual = file.metadata()?.len();
        if actual < expected {
            return Err(IndexError::Format(format!(
                "truncated bucket table: {} bytes, expected {}",
                actual, expected
            )));
        }

        Ok(BucketTable { file, header })
    }

    pub fn header(&self) -> &BucketHeader {
        &self.header
    }

    pub fn num_buckets(&self) -> u64 {
        self.header.num_buckets
    }

    pub fn hash_seed(&self) -> u64 {
        self.header.hash_seed
    }

    fn entry_offset(&self, bucket_id: u64) -> Result<u64> {
        if bucket_id >= self.header.num_buckets {
            return Err(IndexError::OutOfRange {
                bucket_id,
                num_buckets: self.header.num_buckets,
            });
        }
        Ok(self.header.header_size as u64 + bucket_id * self.header.entry_size as u64)
    }

    /// Head node offset for `bucket_id`, or `EMPTY_CHAIN`.
    pub fn read_head(&self, bucket_id: u64) -> Result<u64> {
        let pos = self.entry_offset(bucket_id)?;
        let mut buf = [0u8; 8];
        read_exact_at(&self.file, &mut buf, pos, "bucket entry")?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn write_head(&self, bucket_id: u64, head: u64) -> Result<()> {
        let pos = self.entry_offset(bucket_id)?;
        write_all_at(&self.file, &head.to_le_bytes(), pos)?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
