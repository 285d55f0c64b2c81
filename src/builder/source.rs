use std::io::BufRead;

use crate::error::Result;
use crate::types::RecordOffset;

/// One line of the tabular source and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub offset: RecordOffset,
    /// Line bytes without their `\n` / `\r\n` terminator, exactly as stored.
    pub bytes: Vec<u8>,
}

/// Sequential line scanner that tracks absolute byte offsets.
pub struct SourceReader<R> {
    inner: R,
    offset: u64,
    buf: Vec<u8>,
}

impl<R: BufRead> SourceReader<R> {
    pub fn new(inner: R) -> Self {
        SourceReader {
            inner,
            offset: 0,
            buf: Vec::new(),
        }
    }

    pub fn next_line(&mut self) -> Result<Option<SourceLine>> {
        self.buf.clear();
        let n = self.inner.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }

        let start = self.offset;
        self.offset += n as u64;

        let mut end = self.buf.len();
        if end > 0 && self.buf[end - 1] == b'\n' {
            end -= 1;
            if end > 0 && self.buf[end - 1] == b'\r' {
                end -= 1;
            }
        }

        Ok(Some(SourceLine {
            offset: start,
            bytes: self.buf[..end].to_vec(),
        }))
    }
}

impl<R: BufRead> Iterator for SourceReader<R> {
    type Item = Result<SourceLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}
