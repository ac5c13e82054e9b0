//! Record wire format.
//!
//! ```text
//! put:    [varint(key_len + 1)][varint(value_len)][key][value]
//! delete: [0x00][varint(key_len)][key]
//! ```
//!
//! The first varint of a put is at least 1, and a varint never starts with a
//! zero byte unless it encodes zero, so a leading `0x00` marks a tombstone.

use crate::block::BlockPositionedRead;
use crate::error::{Error, Result};
use crate::varint::{self, MAX_VARINT_LEN};

/// Largest key or value length accepted when decoding.
const MAX_DECODED_LEN: u64 = u32::MAX as u64;

/// Scratch space big enough for any record header.
pub type HeaderBuf = [u8; 2 * MAX_VARINT_LEN];

/// A decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A key-value pair.
    Put {
        /// Record key
        key: Vec<u8>,
        /// Record value
        value: Vec<u8>,
    },
    /// A tombstone for `key`.
    Delete {
        /// Deleted key
        key: Vec<u8>,
    },
}

impl LogEntry {
    /// The record's key.
    pub fn key(&self) -> &[u8] {
        match self {
            LogEntry::Put { key, .. } | LogEntry::Delete { key } => key,
        }
    }

    /// The record's value, `None` for tombstones.
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            LogEntry::Put { value, .. } => Some(value),
            LogEntry::Delete { .. } => None,
        }
    }

    /// Whether this record is a tombstone.
    pub fn is_delete(&self) -> bool {
        matches!(self, LogEntry::Delete { .. })
    }
}

/// Header of a record read off a block stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// Length of the key that follows.
    pub key_len: u64,
    /// Length of the value after the key, `None` for tombstones.
    pub value_len: Option<u64>,
}

/// Header size of a put.
pub fn put_header_len(key_len: u64, value_len: u64) -> usize {
    varint::encoded_len(key_len + 1) + varint::encoded_len(value_len)
}

/// Header size reserved for a delete when deciding whether to flush.
///
/// This sizes the key varint as `key_len + 1`, so it can exceed the bytes
/// actually written by one, never fall short.
pub fn delete_header_reserve(key_len: u64) -> usize {
    1 + varint::encoded_len(key_len + 1)
}

/// Encode a put header into `out`, returning the number of bytes used.
pub fn encode_put_header(out: &mut HeaderBuf, key_len: u64, value_len: u64) -> usize {
    let mut cursor: &mut [u8] = &mut out[..];
    varint::put(key_len + 1, &mut cursor);
    varint::put(value_len, &mut cursor);
    put_header_len(key_len, value_len)
}

/// Encode a delete header into `out`, returning the number of bytes used.
pub fn encode_delete_header(out: &mut HeaderBuf, key_len: u64) -> usize {
    out[0] = 0;
    let mut cursor: &mut [u8] = &mut out[1..];
    varint::put(key_len, &mut cursor);
    1 + varint::encoded_len(key_len)
}

fn checked_len(len: u64, what: &str) -> Result<u64> {
    if len > MAX_DECODED_LEN {
        return Err(Error::corrupt_block(format!("{} length {} is implausible", what, len)));
    }
    Ok(len)
}

/// Read the header of the next record.
pub fn read_header(reader: &mut dyn BlockPositionedRead) -> Result<EntryHeader> {
    let first = reader.read_varint()?;
    if first == 0 {
        let key_len = checked_len(reader.read_varint()?, "key")?;
        Ok(EntryHeader { key_len, value_len: None })
    } else {
        let key_len = checked_len(first - 1, "key")?;
        let value_len = checked_len(reader.read_varint()?, "value")?;
        Ok(EntryHeader { key_len, value_len: Some(value_len) })
    }
}

/// Read `len` bytes into a fresh vector.
pub fn read_bytes(reader: &mut dyn BlockPositionedRead, len: u64) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read one whole record.
pub fn read_entry(reader: &mut dyn BlockPositionedRead) -> Result<LogEntry> {
    let header = read_header(reader)?;
    let key = read_bytes(reader, header.key_len)?;
    match header.value_len {
        Some(len) => Ok(LogEntry::Put { key, value: read_bytes(reader, len)? }),
        None => Ok(LogEntry::Delete { key }),
    }
}

/// Parse every record in a decompressed block.
///
/// Fails if the last record runs past the end of `data`.
pub fn parse_block(data: &[u8]) -> Result<Vec<LogEntry>> {
    let mut entries = Vec::new();
    let mut rest = data;

    let take_varint = |rest: &mut &[u8]| -> Result<u64> {
        let (value, used) = varint::decode(rest)
            .ok_or_else(|| Error::corrupt_block("record header cut off at block end"))?;
        *rest = &rest[used..];
        Ok(value)
    };
    let take_bytes = |rest: &mut &[u8], len: u64| -> Result<Vec<u8>> {
        let len = len as usize;
        if rest.len() < len {
            return Err(Error::corrupt_block("record body cut off at block end"));
        }
        let (head, tail) = rest.split_at(len);
        *rest = tail;
        Ok(head.to_vec())
    };

    while !rest.is_empty() {
        let first = take_varint(&mut rest)?;
        if first == 0 {
            let key_len = take_varint(&mut rest)?;
            let key = take_bytes(&mut rest, key_len)?;
            entries.push(LogEntry::Delete { key });
        } else {
            let value_len = take_varint(&mut rest)?;
            let key = take_bytes(&mut rest, first - 1)?;
            let value = take_bytes(&mut rest, value_len)?;
            entries.push(LogEntry::Put { key, value });
        }
    }
    Ok(entries)
}
