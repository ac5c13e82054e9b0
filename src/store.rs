//! Chunked in-memory byte area used to stage the hash index.
//!
//! A hash index for a large file can exceed what a single allocation should
//! hold, so the area is split into chunks of 2^30 bytes (the last one may be
//! shorter). Access goes through a cursor: `seek` positions it, and byte reads
//! and writes advance it across chunk boundaries.

use crate::error::{Error, Result};
use std::fmt;
use std::io::{Read, Write};

/// log2 of the chunk size.
pub const CHUNK_BITS: u32 = 30;

/// Upper bound on the number of chunks a store may have.
const MAX_CHUNKS: u64 = i32::MAX as u64;

/// Fixed-size byte area backed by bounded chunks.
pub struct ChunkedStore {
    chunks: Vec<Vec<u8>>,
    size: u64,
    chunk_bits: u32,
    chunk_index: usize,
    chunk_pos: usize,
}

impl ChunkedStore {
    /// Allocate a zeroed store of `size` bytes.
    ///
    /// Fails with `InvalidSize` when the size would need more chunks than the
    /// store can address.
    pub fn new(size: u64) -> Result<Self> {
        Self::with_chunk_bits(size, CHUNK_BITS)
    }

    pub(crate) fn with_chunk_bits(size: u64, chunk_bits: u32) -> Result<Self> {
        let chunk_size = 1u64 << chunk_bits;
        let num_chunks = (size >> chunk_bits) + u64::from(size & (chunk_size - 1) != 0);
        if num_chunks > MAX_CHUNKS {
            return Err(Error::invalid_size(format!("too large size: {}", size)));
        }

        let chunks = (0..num_chunks)
            .map(|i| {
                let len = (size - (i << chunk_bits)).min(chunk_size);
                vec![0u8; len as usize]
            })
            .collect();

        Ok(Self { chunks, size, chunk_bits, chunk_index: 0, chunk_pos: 0 })
    }

    /// Declared size in bytes.
    pub fn len(&self) -> u64 {
        self.size
    }

    /// Whether the store holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of chunks backing the store.
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Absolute cursor position.
    pub fn position(&self) -> u64 {
        ((self.chunk_index as u64) << self.chunk_bits) + self.chunk_pos as u64
    }

    /// Move the cursor to `pos`. Positions past the end fail with `OutOfRange`.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.size {
            return Err(Error::out_of_range(format!(
                "seek to {} in a store of {} bytes",
                pos, self.size
            )));
        }
        self.chunk_index = (pos >> self.chunk_bits) as usize;
        self.chunk_pos = (pos & ((1u64 << self.chunk_bits) - 1)) as usize;
        Ok(())
    }

    /// Bytes addressable in the current chunk from the cursor on, stepping
    /// into the next chunk when the current one is used up.
    fn room(&mut self) -> Result<usize> {
        if self.chunk_pos == 1usize << self.chunk_bits {
            self.chunk_index += 1;
            self.chunk_pos = 0;
        }
        match self.chunks.get(self.chunk_index) {
            Some(chunk) if self.chunk_pos < chunk.len() => Ok(chunk.len() - self.chunk_pos),
            _ => Err(Error::out_of_range(format!(
                "cursor at {} past the end of a store of {} bytes",
                self.position(),
                self.size
            ))),
        }
    }

    /// Write one byte at the cursor and advance.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.room()?;
        self.chunks[self.chunk_index][self.chunk_pos] = value;
        self.chunk_pos += 1;
        Ok(())
    }

    /// Read one byte at the cursor and advance.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.room()?;
        let value = self.chunks[self.chunk_index][self.chunk_pos];
        self.chunk_pos += 1;
        Ok(value)
    }

    /// Write `data` at the cursor, spanning chunks as needed.
    pub fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = self.room()?.min(data.len());
            let start = self.chunk_pos;
            self.chunks[self.chunk_index][start..start + n].copy_from_slice(&data[..n]);
            self.chunk_pos += n;
            data = &data[n..];
        }
        Ok(())
    }

    /// Fill `buf` from the cursor, spanning chunks as needed.
    pub fn read_exact(&mut self, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.room()?.min(buf.len());
            let start = self.chunk_pos;
            buf[..n].copy_from_slice(&self.chunks[self.chunk_index][start..start + n]);
            self.chunk_pos += n;
            buf = &mut buf[n..];
        }
        Ok(())
    }

    /// Write a little-endian `u32` at the cursor.
    pub fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Write a little-endian `u64` at the cursor.
    pub fn write_u64_le(&mut self, value: u64) -> Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Read a little-endian `u32` at the cursor.
    pub fn read_u32_le(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read a little-endian `u64` at the cursor.
    pub fn read_u64_le(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Write every chunk, in order, to `sink`.
    pub fn flush_to<W: Write + ?Sized>(&self, sink: &mut W) -> Result<()> {
        for chunk in &self.chunks {
            sink.write_all(chunk)?;
        }
        Ok(())
    }

    /// Fill every chunk, in order, from `source`. The cursor is left at 0.
    ///
    /// A source shorter than the store fails with `UnexpectedEof`.
    pub fn load_from<R: Read + ?Sized>(&mut self, source: &mut R) -> Result<()> {
        for chunk in &mut self.chunks {
            source.read_exact(chunk)?;
        }
        self.chunk_index = 0;
        self.chunk_pos = 0;
        Ok(())
    }

    /// Release all chunk memory. Any later access fails with `OutOfRange`.
    pub fn close(&mut self) {
        self.chunks = Vec::new();
        self.chunk_index = 0;
        self.chunk_pos = 0;
    }
}

impl fmt::Debug for ChunkedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedStore")
            .field("size", &self.size)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_layout() {
        let store = ChunkedStore::with_chunk_bits(40, 4).unwrap();
        assert_eq!(store.num_chunks(), 3);
        assert_eq!(store.len(), 40);

        let exact = ChunkedStore::with_chunk_bits(32, 4).unwrap();
        assert_eq!(exact.num_chunks(), 2);

        let empty = ChunkedStore::new(0).unwrap();
        assert_eq!(empty.num_chunks(), 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_too_large() {
        let err = ChunkedStore::with_chunk_bits(u64::MAX, 4).unwrap_err();
        assert!(matches!(err, Error::InvalidSize(_)));
    }

    #[test]
    fn test_sequential_write_then_seek_read() {
        let size = 16 * 3 + 5;
        let mut store = ChunkedStore::with_chunk_bits(size, 4).unwrap();
        for i in 0..size {
            store.write_u8((i * 7 % 251) as u8).unwrap();
        }
        assert_eq!(store.position(), size);

        for k in [0, 15, 16, 17, 31, 32, 50, size - 1] {
            store.seek(k).unwrap();
            assert_eq!(store.read_u8().unwrap(), (k * 7 % 251) as u8, "position {}", k);
        }
    }

    #[test]
    fn test_past_end() {
        let mut store = ChunkedStore::with_chunk_bits(20, 4).unwrap();
        assert!(matches!(store.seek(21), Err(Error::OutOfRange(_))));

        store.seek(20).unwrap();
        assert!(matches!(store.write_u8(1), Err(Error::OutOfRange(_))));

        store.seek(18).unwrap();
        assert!(matches!(store.write_all(&[1, 2, 3]), Err(Error::OutOfRange(_))));
    }

    #[test]
    fn test_boundary_at_exact_chunk_end() {
        let mut store = ChunkedStore::with_chunk_bits(32, 4).unwrap();
        store.seek(32).unwrap();
        assert!(matches!(store.read_u8(), Err(Error::OutOfRange(_))));
    }

    #[test]
    fn test_multibyte_across_chunks() {
        let mut store = ChunkedStore::with_chunk_bits(32, 4).unwrap();
        store.seek(13).unwrap();
        store.write_u64_le(0x0102_0304_0506_0708).unwrap();
        store.write_u32_le(0xDEAD_BEEF).unwrap();

        store.seek(13).unwrap();
        assert_eq!(store.read_u64_le().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(store.read_u32_le().unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_flush_to_sink() {
        let mut store = ChunkedStore::with_chunk_bits(20, 3).unwrap();
        let data: Vec<u8> = (0..20).collect();
        store.write_all(&data).unwrap();

        let mut sink = Vec::new();
        store.flush_to(&mut sink).unwrap();
        assert_eq!(sink, data);
    }

    #[test]
    fn test_load_from_source() {
        let data: Vec<u8> = (0..40).collect();
        let mut store = ChunkedStore::with_chunk_bits(40, 4).unwrap();
        store.load_from(&mut &data[..]).unwrap();
        assert_eq!(store.position(), 0);

        store.seek(33).unwrap();
        assert_eq!(store.read_u8().unwrap(), 33);

        let mut short = ChunkedStore::with_chunk_bits(40, 4).unwrap();
        assert!(matches!(short.load_from(&mut &data[..30]), Err(Error::Io(_))));
    }

    #[test]
    fn test_close_releases() {
        let mut store = ChunkedStore::with_chunk_bits(20, 4).unwrap();
        store.close();
        assert_eq!(store.num_chunks(), 0);
        assert!(store.read_u8().is_err());
    }

    #[test]
    #[ignore = "allocates and walks more than 1GB"]
    fn test_full_size_chunks() {
        let size = (1u64 << CHUNK_BITS) + 100;
        let mut store = ChunkedStore::new(size).unwrap();
        assert_eq!(store.num_chunks(), 2);

        let pattern: Vec<u8> = (0..=255u8).collect();
        while store.position() < size {
            let left = (size - store.position()) as usize;
            store.write_all(&pattern[..left.min(pattern.len())]).unwrap();
        }

        for k in [0, (1u64 << CHUNK_BITS) - 1, 1u64 << CHUNK_BITS, size - 1] {
            store.seek(k).unwrap();
            assert_eq!(store.read_u8().unwrap(), (k % 256) as u8);
        }
    }
}
