use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::path::Path;

use tracing::debug;

use crate::error::{IndexError, Result};
use crate::storage::codec::{ByteReader, ByteWriter};
use crate::storage::io::{read_exact_at, write_all_at};

/// Reserved region at the start of a node log. No node starts inside it, which
/// keeps offset 0 free to mean "no node".
pub const ARRAYS_HEADER_SIZE: u64 = 4096;

/// One chain node as stored in the log.
///
/// Layout: key_len(u16) | key bytes | list_len(u32) | offsets[list_len](u64) | next_ptr(u64)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Raw, trimmed source field bytes. Not normalized and not necessarily UTF-8.
    pub key: Vec<u8>,
    pub offsets: Vec<u64>,
    /// Offset of the previous chain head, or 0 at the end of the chain.
    pub next_ptr: u64,
}

impl Node {
    /// Encoded size of a node with the given key length and list length.
    pub fn encoded_len(key_len: usize, list_len: usize) -> usize {
        2 + key_len + 4 + list_len * 8 + 8
    }

    /// The key as text, with invalid UTF-8 replaced.
    pub fn key_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }
}

/// Serialize one node into a contiguous buffer.
pub fn encode_node(key: &[u8], offsets: &[u64], next_ptr: u64) -> Result<Vec<u8>> {
    let key_len = u16::try_from(key.len()).map_err(|_| {
        IndexError::Allocation(format!("key of {} bytes exceeds u16 length prefix", key.len()))
    })?;
    let list_len = u32::try_from(offsets.len()).map_err(|_| {
        IndexError::Allocation(format!(
            "offset list of {} entries exceeds u32 length prefix",
            offsets.len()
        ))
    })?;

    let mut w = ByteWriter::with_capacity(Node::encoded_len(key.len(), offsets.len()));
    w.put_u16(key_len);
    w.put_bytes(key);
    w.put_u32(list_len);
    for &off in offsets {
        w.put_u64(off);
    }
    w.put_u64(next_ptr);
    Ok(w.into_inner())
}

/// Append-only log of chain nodes, addressed by absolute byte offset.
///
/// The end of the log is tracked in memory rather than taken from the file
/// cursor, and only advances after a node is fully written.
pub struct NodeLog {
    file: File,
    len: u64,
}

impl NodeLog {
    /// Create (or truncate) a log containing only the reserved header, synced to disk.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        write_all_at(&file, &[0u8; ARRAYS_HEADER_SIZE as usize], 0)?;
        file.sync_all()?;

        debug!(path = %path.display(), "created node log");
        Ok(NodeLog {
            file,
            len: ARRAYS_HEADER_SIZE,
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_file(file)
    }

    pub fn open_read_only(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_file(file)
    }

    fn from_file(file: File) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(NodeLog {
            file,
            // A fresh log whose header never reached disk still appends past it.
            len: len.max(ARRAYS_HEADER_SIZE),
        })
    }

    /// Logical end of the log: where the next node will be written.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True when the log holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len <= ARRAYS_HEADER_SIZE
    }

    /// Append a node and return the offset it was written at.
    ///
    /// On error nothing is recorded: the logical end does not move, and the
    /// caller must not link the node into any chain.
    pub fn append<K: AsRef<[u8]> + ?Sized>(
        &mut self,
        key: &K,
        offsets: &[u64],
        next_ptr: u64,
    ) -> Result<u64> {
        let buf = encode_node(key.as_ref(), offsets, next_ptr)?;
        let node_off = self.len;
        write_all_at(&self.file, &buf, node_off)?;
        self.len = node_off + buf.len() as u64;
        Ok(node_off)
    }

    /// Read the node starting at `node_off`. The caller owns the result.
    pub fn read_node(&self, node_off: u64) -> Result<Node> {
        if node_off < ARRAYS_HEADER_SIZE {
            return Err(IndexError::Format(format!(
                "node offset {} lies inside the log header",
                node_off
            )));
        }

        let mut len_buf = [0u8; 2];
        read_exact_at(&self.file, &mut len_buf, node_off, "node key length")?;
        let key_len = u16::from_le_bytes(len_buf) as usize;

        let mut head = vec![0u8; key_len + 4];
        read_exact_at(&self.file, &mut head, node_off + 2, "node key")?;
        let mut r = ByteReader::new(&head);
        let key_bytes = r.get_bytes(key_len, "node key")?;
        let list_len = r.get_u32("node list length")? as u64;

        let tail_off = node_off + 2 + key_len as u64 + 4;
        let tail_len = list_len * 8 + 8;
        if tail_off.saturating_add(tail_len) > self.len {
            return Err(IndexError::Format(format!(
                "truncated node at offset {}: list of {} offsets runs past end of log",
                node_off, list_len
            )));
        }
        let mut tail = Vec::new();
        tail.try_reserve_exact(tail_len as usize).map_err(|e| {
            IndexError::Allocation(format!("node offset list of {} entries: {}", list_len, e))
        })?;
        tail.resize(tail_len as usize, 0);
        read_exact_at(&self.file, &mut tail, tail_off, "node offsets")?;

        let mut r = ByteReader::new(&tail);
        let mut offsets = Vec::with_capacity(list_len as usize);
        for _ in 0..list_len {
            offsets.push(r.get_u64("node offset")?);
        }
        let next_ptr = r.get_u64("node next pointer")?;

        Ok(Node {
            key: key_bytes.to_vec(),
            offsets,
            next_ptr,
        })
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("title_arrays.dat");
        let mut log = NodeLog::create(&path).unwrap();
        assert!(log.is_empty());

        let first = log.append("The Hobbit", &[120, 4500, 9], 0).unwrap();
        assert_eq!(first, ARRAYS_HEADER_SIZE);
        let second = log.append("Dune", &[77], first).unwrap();
        assert_eq!(second, first + Node::encoded_len(10, 3) as u64);
        assert_eq!(log.len(), second + Node::encoded_len(4, 1) as u64);

        let node = log.read_node(first).unwrap();
        assert_eq!(node.key, b"The Hobbit");
        assert_eq!(node.offsets, vec![120, 4500, 9]);
        assert_eq!(node.next_ptr, 0);

        let node = log.read_node(second).unwrap();
        assert_eq!(node.key, b"Dune");
        assert_eq!(node.offsets, vec![77]);
        assert_eq!(node.next_ptr, first);
    }

    #[test]
    fn test_node_byte_layout() {
        let buf = encode_node(b"ab", &[1, 2], 4096).unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(&2u16.to_le_bytes());
        expected.extend_from_slice(b"ab");
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.extend_from_slice(&2u64.to_le_bytes());
        expected.extend_from_slice(&4096u64.to_le_bytes());
        assert_eq!(buf, expected);
        assert_eq!(buf.len(), Node::encoded_len(2, 2));
    }

    #[test]
    fn test_empty_key_and_empty_list() {
        let dir = TempDir::new().unwrap();
        let mut log = NodeLog::create(&dir.path().join("a.dat")).unwrap();
        let off = log.append("", &[], 0).unwrap();
        let node = log.read_node(off).unwrap();
        assert!(node.key.is_empty());
        assert!(node.offsets.is_empty());
    }

    #[test]
    fn test_utf8_key_preserved() {
        let dir = TempDir::new().unwrap();
        let mut log = NodeLog::create(&dir.path().join("a.dat")).unwrap();
        let off = log.append("Gabriel García Márquez", &[42], 0).unwrap();
        assert_eq!(log.read_node(off).unwrap().key_str(), "Gabriel García Márquez");
    }

    #[test]
    fn test_non_utf8_key_stored_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.dat");
        let mut log = NodeLog::create(&path).unwrap();
        let off = log.append(&b"Caf\xe9"[..], &[7], 0).unwrap();
        drop(log);

        let raw = std::fs::read(&path).unwrap();
        let at = off as usize;
        assert_eq!(&raw[at..at + 6], &[4, 0, b'C', b'a', b'f', 0xe9]);

        let log = NodeLog::open_read_only(&path).unwrap();
        let node = log.read_node(off).unwrap();
        assert_eq!(node.key, b"Caf\xe9");
        assert_eq!(node.key_str(), "Caf\u{FFFD}");
    }

    #[test]
    fn test_reopen_appends_at_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.dat");
        let first = {
            let mut log = NodeLog::create(&path).unwrap();
            log.append("one", &[1], 0).unwrap()
        };

        let mut log = NodeLog::open(&path).unwrap();
        let second = log.append("two", &[2], first).unwrap();
        assert!(second > first);
        assert_eq!(log.read_node(second).unwrap().next_ptr, first);
        assert_eq!(log.read_node(first).unwrap().key, b"one");
    }

    #[test]
    fn test_open_clamps_to_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.dat");
        std::fs::write(&path, b"").unwrap();

        let mut log = NodeLog::open(&path).unwrap();
        let off = log.append("k", &[5], 0).unwrap();
        assert_eq!(off, ARRAYS_HEADER_SIZE);
    }

    #[test]
    fn test_key_too_long() {
        let dir = TempDir::new().unwrap();
        let mut log = NodeLog::create(&dir.path().join("a.dat")).unwrap();
        let key = "x".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            log.append(&key, &[1], 0),
            Err(IndexError::Allocation(_))
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn test_read_rejects_header_and_truncated_nodes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.dat");
        let mut log = NodeLog::create(&path).unwrap();
        assert!(matches!(log.read_node(0), Err(IndexError::Format(_))));

        let off = log.append("partial", &[1, 2, 3], 0).unwrap();
        drop(log);

        // Chop the node's tail as a crash mid-append would.
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(off + 12).unwrap();
        drop(file);

        let log = NodeLog::open_read_only(&path).unwrap();
        assert!(matches!(log.read_node(off), Err(IndexError::Format(_))));
    }
}
