use std::fmt;
use std::str::FromStr;

use crate::error::IndexError;

/// Byte offset of a row in the tabular source file.
pub type RecordOffset = u64;

/// Indexed column of the book source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Author,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::Title, Field::Author];

    /// Zero-based column position in each source row.
    pub fn column(self) -> usize {
        match self {
            Field::Title => 0,
            Field::Author => 1,
        }
    }

    /// Name used in index file names.
    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Author => "author",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(Field::Title),
            "author" | "author_name" => Ok(Field::Author),
            other => Err(IndexError::Source(format!("unknown index field '{}'", other))),
        }
    }
}

/// How a chain node's stored key is compared with the query key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Raw, case-sensitive byte equality.
    #[default]
    Exact,
    /// Equality of the normalized forms (the same transform used for hashing).
    Normalized,
}
