//! Hash index over the data region.
//!
//! An indexed data file looks like
//!
//! ```text
//! [block]* [index table] [footer]
//! ```
//!
//! The index table is an open-addressed array of fixed-width slots:
//!
//! ```text
//! [hash: 4 or 8][block position: u64][offset in block: u32]
//! ```
//!
//! A hash of zero marks an empty slot; real hashes are never zero. A key's
//! first slot is `hash % slot_count` and collisions advance by a stride taken
//! from a second hash, coprime with the slot count. Each slot points at the
//! most recent record for its key, which may be a tombstone.

pub mod builder;
pub mod footer;
pub mod hash;

pub use builder::{slot_count, BuiltIndex, IndexBuilder};
pub use footer::{Footer, FOOTER_LEN};
pub use hash::{key_hash, stride_hash, Probe};

use crate::block::{self, BlockPositionedRead};
use crate::config::{CompressionType, HashType};
use crate::error::Result;
use crate::pool::BufferPoolRegistry;
use crate::record;
use crate::store::ChunkedStore;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::sync::Arc;

/// Where a record starts: the block holding its first byte and the offset
/// of that byte in the uncompressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPosition {
    /// Sink offset of the block
    pub block_position: u64,
    /// Offset within the uncompressed block
    pub offset: u32,
}

/// An occupied index slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Key hash, never zero
    pub hash: u64,
    /// Most recent record for the key
    pub position: RecordPosition,
}

/// Encodes slots of one hash width into a chunked store.
#[derive(Debug, Clone, Copy)]
pub struct SlotLayout {
    hash_type: HashType,
}

impl SlotLayout {
    /// Layout for a resolved hash width.
    pub fn new(hash_type: HashType) -> Self {
        Self { hash_type }
    }

    /// Encoded slot size: hash, block position and offset.
    pub fn slot_len(&self) -> usize {
        self.hash_type.width_bytes() + 8 + 4
    }

    /// Read slot `index`; `None` if it is empty.
    pub fn read_slot(&self, table: &mut ChunkedStore, index: u64) -> Result<Option<Slot>> {
        table.seek(index * self.slot_len() as u64)?;
        let hash = match self.hash_type {
            HashType::Hash32 => u64::from(table.read_u32_le()?),
            _ => table.read_u64_le()?,
        };
        if hash == 0 {
            return Ok(None);
        }
        let block_position = table.read_u64_le()?;
        let offset = table.read_u32_le()?;
        Ok(Some(Slot { hash, position: RecordPosition { block_position, offset } }))
    }

    /// Write `slot` at `index`.
    pub fn write_slot(&self, table: &mut ChunkedStore, index: u64, slot: &Slot) -> Result<()> {
        table.seek(index * self.slot_len() as u64)?;
        match self.hash_type {
            HashType::Hash32 => table.write_u32_le(slot.hash as u32)?,
            _ => table.write_u64_le(slot.hash)?,
        }
        table.write_u64_le(slot.position.block_position)?;
        table.write_u32_le(slot.position.offset)
    }
}

/// Summary of a built index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexInfo {
    /// Slots in the table
    pub slot_count: u64,
    /// Hash width used
    pub hash_type: HashType,
    /// Records observed, tombstones included
    pub num_records: u64,
    /// Keys whose most recent record is a put
    pub num_live: u64,
}

/// Outcome of comparing a key with the record at a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMatch {
    /// The record belongs to a different key.
    Other,
    /// The key's most recent record is a tombstone.
    Deleted,
    /// The key is present; the value is filled in when it was asked for.
    Present(Option<Vec<u8>>),
}

/// `Read` over a byte range of a shared file handle.
///
/// Every read seeks first, so several slices can take turns on one handle.
struct FileSlice<'a> {
    file: &'a File,
    pos: u64,
    end: u64,
}

impl Read for FileSlice<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.end || buf.is_empty() {
            return Ok(0);
        }
        let want = (self.end - self.pos).min(buf.len() as u64) as usize;
        let mut file = self.file;
        file.seek(SeekFrom::Start(self.pos))?;
        let n = file.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// The record area of a data file, opened for random reads.
pub struct DataRegion {
    file: File,
    data_end: u64,
    compression: CompressionType,
    max_block_size: usize,
    pools: Arc<BufferPoolRegistry>,
}

impl DataRegion {
    /// Wrap `file`, whose records occupy `[0, data_end)`.
    pub fn new(
        file: File,
        data_end: u64,
        compression: CompressionType,
        max_block_size: usize,
        pools: Arc<BufferPoolRegistry>,
    ) -> Self {
        Self { file, data_end, compression, max_block_size, pools }
    }

    /// End of the record area.
    pub fn data_end(&self) -> u64 {
        self.data_end
    }

    /// Block reader positioned at the block starting at `block_position`.
    pub fn reader_at(&self, block_position: u64) -> Box<dyn BlockPositionedRead + Send + '_> {
        let slice = FileSlice { file: &self.file, pos: block_position, end: self.data_end };
        block::new_reader(
            BufReader::new(slice),
            self.compression,
            self.max_block_size,
            block_position,
            &self.pools,
        )
    }

    /// Compare `key` with the record at `position`.
    pub fn match_at(&self, position: RecordPosition, key: &[u8], read_value: bool) -> Result<KeyMatch> {
        let mut reader = self.reader_at(position.block_position);
        reader.skip(u64::from(position.offset))?;

        let header = record::read_header(&mut *reader)?;
        if header.key_len != key.len() as u64 {
            return Ok(KeyMatch::Other);
        }
        let stored = record::read_bytes(&mut *reader, header.key_len)?;
        if stored != key {
            return Ok(KeyMatch::Other);
        }

        match header.value_len {
            None => Ok(KeyMatch::Deleted),
            Some(_) if !read_value => Ok(KeyMatch::Present(None)),
            Some(len) => Ok(KeyMatch::Present(Some(record::read_bytes(&mut *reader, len)?))),
        }
    }
}
