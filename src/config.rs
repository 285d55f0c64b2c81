use std::path::{Path, PathBuf};

use crate::hash::{next_pow2, DEFAULT_HASH_SEED};
use crate::types::{Field, MatchMode};

/// Bucket count used when none is requested.
pub const DEFAULT_NUM_BUCKETS: u64 = 4096;

/// Build and lookup settings for a pair of title/author indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub title_buckets: u64,
    pub author_buckets: u64,
    pub hash_seed: u64,
    pub match_mode: MatchMode,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            title_buckets: DEFAULT_NUM_BUCKETS,
            author_buckets: DEFAULT_NUM_BUCKETS,
            hash_seed: DEFAULT_HASH_SEED,
            match_mode: MatchMode::Exact,
        }
    }
}

impl IndexConfig {
    /// Copy of this config with both bucket counts rounded up to powers of two.
    pub fn normalized(&self) -> Self {
        IndexConfig {
            title_buckets: next_pow2(self.title_buckets),
            author_buckets: next_pow2(self.author_buckets),
            ..self.clone()
        }
    }

    pub fn buckets_for(&self, field: Field) -> u64 {
        match field {
            Field::Title => self.title_buckets,
            Field::Author => self.author_buckets,
        }
    }
}

/// File locations of one field's index under an index directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub buckets: PathBuf,
    pub arrays: PathBuf,
    pub lock: PathBuf,
}

impl IndexPaths {
    /// `<dir>/<field>_buckets.dat`, `<dir>/<field>_arrays.dat`, `<dir>/<field>_buckets.lock`.
    pub fn new(dir: &Path, field: Field) -> Self {
        Self::from_files(
            &dir.join(format!("{}_buckets.dat", field.name())),
            &dir.join(format!("{}_arrays.dat", field.name())),
        )
    }

    pub fn from_files(buckets: &Path, arrays: &Path) -> Self {
        IndexPaths {
            buckets: buckets.to_path_buf(),
            arrays: arrays.to_path_buf(),
            lock: buckets.with_extension("lock"),
        }
    }

    pub fn exists(&self) -> bool {
        self.buckets.exists() && self.arrays.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let paths = IndexPaths::new(Path::new("data/index"), Field::Author);
        assert_eq!(paths.buckets, PathBuf::from("data/index/author_buckets.dat"));
        assert_eq!(paths.arrays, PathBuf::from("data/index/author_arrays.dat"));
        assert_eq!(paths.lock, PathBuf::from("data/index/author_buckets.lock"));
    }

    #[test]
    fn test_power_of_two_rounding() {
        let config = IndexConfig {
            title_buckets: 4096,
            author_buckets: 3000,
            ..IndexConfig::default()
        }
        .normalized();
        assert_eq!(config.title_buckets, 4096);
        assert_eq!(config.author_buckets, 4096);
        assert_eq!(config.buckets_for(Field::Author), 4096);

        let zero = IndexConfig {
            title_buckets: 0,
            ..IndexConfig::default()
        };
        assert_eq!(zero.normalized().title_buckets, 1);
    }
}
