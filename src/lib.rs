//! ShelfIndex: persistent file-backed hash index for a book catalog.
//!
//! Maps book titles and author names to the byte offsets of their rows in a
//! flat comma-separated source file:
//! - one bucket table + one append-only node log per indexed field
//! - FNV-1a hashing of a normalized key prefix, seed stored in the table header
//! - streaming single-pass build, newest-first collision chains
//! - exact-match lookup that never loads the source into memory

pub mod builder;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod hash;
pub mod index;
pub mod query;
pub mod storage;
pub mod types;

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::index::FieldIndex;
use crate::query::{combine, err_response, ok_response, read_record, Request};
use crate::types::{Field, RecordOffset};

pub use crate::builder::{build_all, build_index, BuildReport, BuildStats, Builder};

/// Title and author indexes over one source file.
pub struct Catalog {
    title: Option<FieldIndex>,
    author: Option<FieldIndex>,
    source_path: PathBuf,
}

impl Catalog {
    /// Open both indexes under `index_dir`. A field whose index cannot be
    /// opened is logged and left unavailable; searches on it fail.
    pub fn open(index_dir: &Path, source_path: &Path, config: &IndexConfig) -> Self {
        let open = |field: Field| match FieldIndex::open(index_dir, field) {
            Ok(index) => Some(index.with_match_mode(config.match_mode)),
            Err(e) => {
                warn!(%field, error = %e, "index unavailable");
                None
            }
        };
        Catalog {
            title: open(Field::Title),
            author: open(Field::Author),
            source_path: source_path.to_path_buf(),
        }
    }

    /// Assemble a catalog from already opened indexes.
    pub fn from_parts(
        title: Option<FieldIndex>,
        author: Option<FieldIndex>,
        source_path: &Path,
    ) -> Self {
        Catalog {
            title,
            author,
            source_path: source_path.to_path_buf(),
        }
    }

    pub fn index(&self, field: Field) -> Option<&FieldIndex> {
        match field {
            Field::Title => self.title.as_ref(),
            Field::Author => self.author.as_ref(),
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    fn lookup_field(&self, field: Field, key: Option<&str>) -> Result<Option<Vec<RecordOffset>>> {
        let Some(key) = key else {
            return Ok(None);
        };
        let index = self
            .index(field)
            .ok_or_else(|| IndexError::Protocol(format!("{} index is not available", field)))?;
        index.lookup(key).map(Some)
    }

    /// Record offsets matching every non-empty field of `request`.
    pub fn search(&self, request: &Request) -> Result<Vec<RecordOffset>> {
        let title = self.lookup_field(Field::Title, request.title())?;
        let author = self.lookup_field(Field::Author, request.author())?;
        Ok(combine(title, author))
    }

    /// Source rows for `offsets`, in order. Offsets past end of file are skipped.
    pub fn records(&self, offsets: &[RecordOffset]) -> Result<Vec<String>> {
        let mut source = File::open(&self.source_path)?;
        let mut rows = Vec::with_capacity(offsets.len());
        for &off in offsets {
            match read_record(&mut source, off)? {
                Some(row) => rows.push(row),
                None => debug!(offset = off, "record offset past end of source"),
            }
        }
        Ok(rows)
    }

    /// Answer one request line with framed response lines.
    pub fn respond(&self, line: &str) -> Vec<String> {
        let request = match Request::parse(line) {
            Ok(request) => request,
            Err(IndexError::Protocol(msg)) => return err_response(&msg),
            Err(e) => return err_response(&e.to_string()),
        };
        debug!(title = %request.title, author = %request.author, "search");

        let offsets = match self.search(&request) {
            Ok(offsets) => offsets,
            Err(e) => {
                warn!(error = %e, "lookup failed");
                return err_response("Internal lookup error");
            }
        };
        if offsets.is_empty() {
            return ok_response(Vec::new());
        }

        match self.records(&offsets) {
            Ok(rows) => ok_response(rows),
            Err(e) => {
                warn!(source = %self.source_path.display(), error = %e, "cannot read source");
                err_response("Cannot open source file")
            }
        }
    }
}
