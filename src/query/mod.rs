//! Line protocol support: `"<title>|<author>"` requests answered with the
//! matching source rows.
//!
//! A response is `OK`, one line per record, then `<END>`. Failures are a
//! single `ERR|<message>` line followed by `<END>`.

pub mod fifo;
pub mod render;
pub mod server;

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use crate::error::{IndexError, Result};
use crate::types::RecordOffset;

pub const RESPONSE_OK: &str = "OK";
pub const RESPONSE_END: &str = "<END>";
pub const RESPONSE_ERR_PREFIX: &str = "ERR|";

/// A parsed search request. Empty strings mean "not searched on".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub title: String,
    pub author: String,
}

impl Request {
    /// Split on the first `|`; a line without one is title-only.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        let (title, author) = line.split_once('|').unwrap_or((line, ""));
        let request = Request {
            title: title.trim().to_string(),
            author: author.trim().to_string(),
        };
        if request.title.is_empty() && request.author.is_empty() {
            return Err(IndexError::Protocol(
                "Search must have at least one parameter".to_string(),
            ));
        }
        Ok(request)
    }

    pub fn title(&self) -> Option<&str> {
        Some(self.title.as_str()).filter(|s| !s.is_empty())
    }

    pub fn author(&self) -> Option<&str> {
        Some(self.author.as_str()).filter(|s| !s.is_empty())
    }
}

/// Merge per-field results. With both present, keep the title hits that also
/// matched the author. Duplicates are dropped, first occurrence wins.
pub fn combine(
    title: Option<Vec<RecordOffset>>,
    author: Option<Vec<RecordOffset>>,
) -> Vec<RecordOffset> {
    let merged = match (title, author) {
        (Some(t), Some(a)) => {
            let by_author: HashSet<RecordOffset> = a.into_iter().collect();
            t.into_iter().filter(|off| by_author.contains(off)).collect()
        }
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => Vec::new(),
    };
    dedup_in_order(merged)
}

fn dedup_in_order(offsets: Vec<RecordOffset>) -> Vec<RecordOffset> {
    let mut seen = HashSet::with_capacity(offsets.len());
    offsets.into_iter().filter(|off| seen.insert(*off)).collect()
}

/// Read the single source line starting at `offset`, without its terminator.
/// `None` if `offset` is at or past end of file.
pub fn read_record<S: Read + Seek>(source: &mut S, offset: RecordOffset) -> Result<Option<String>> {
    source.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::new();
    let n = BufReader::new(source).read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Frame a successful response.
pub fn ok_response(records: Vec<String>) -> Vec<String> {
    let mut lines = Vec::with_capacity(records.len() + 2);
    lines.push(RESPONSE_OK.to_string());
    lines.extend(records);
    lines.push(RESPONSE_END.to_string());
    lines
}

/// Frame an error response.
pub fn err_response(message: &str) -> Vec<String> {
    vec![
        format!("{}{}", RESPONSE_ERR_PREFIX, message),
        RESPONSE_END.to_string(),
    ]
}
