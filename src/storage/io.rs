//! Positioned (offset-addressed) file I/O.
//!
//! None of these helpers touch the file cursor, so a single `File` can be
//! shared by every reader of an index without seeking. Interrupted system
//! calls are retried here and never reach the caller.

use std::fs::File;
use std::io::{self, ErrorKind};

use crate::error::{IndexError, Result};

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(unix)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, buf, offset)
}

#[cfg(windows)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

#[cfg(windows)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, buf, offset)
}

/// Read into `buf` until it is full or end-of-file is reached.
/// Returns the number of bytes actually read.
pub fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match pread(file, &mut buf[total..], offset + total as u64) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Read exactly `buf.len()` bytes at `offset`. A short read means the record
/// runs past end-of-file and is reported as a format error naming `what`.
pub fn read_exact_at(file: &File, buf: &mut [u8], offset: u64, what: &str) -> Result<()> {
    let n = read_full_at(file, buf, offset)?;
    if n != buf.len() {
        return Err(IndexError::Format(format!(
            "truncated {} at offset {}: expected {} bytes, got {}",
            what,
            offset,
            buf.len(),
            n
        )));
    }
    Ok(())
}

/// Write all of `buf` at `offset`.
pub fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    let mut total = 0;
    while total < buf.len() {
        match pwrite(file, &buf[total..], offset + total as u64) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
