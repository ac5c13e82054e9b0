//! Snappy block reader.

use super::BlockPositionedRead;
use crate::error::{Error, Result};
use crate::pool::{BufferPool, BufferPoolRegistry, MemoryKind};
use crate::varint;
use snap::raw::{decompress_len, max_compress_len, Decoder};
use std::io::{self, Read};
use std::sync::Arc;

/// Presents framed snappy blocks as one continuous byte stream.
///
/// Both working buffers come from the buffer pools and go back on drop.
pub struct SnappyBlockReader<R> {
    source: R,
    uncompressed: Vec<u8>,
    compressed: Vec<u8>,
    buf_pos: usize,
    block_len: usize,
    cur_block_start: u64,
    next_block_start: u64,
    decoder: Decoder,
    uncompressed_pool: Arc<BufferPool>,
    compressed_pool: Arc<BufferPool>,
}

impl<R: Read> SnappyBlockReader<R> {
    /// Create a reader over `source`, which sits at sink offset `start`.
    pub fn new(source: R, max_block_size: usize, start: u64, pools: &BufferPoolRegistry) -> Self {
        let uncompressed_pool = pools.get(max_block_size, MemoryKind::Heap);
        let compressed_pool = pools.get(max_compress_len(max_block_size), MemoryKind::Direct);

        Self {
            source,
            uncompressed: uncompressed_pool.pop(),
            compressed: compressed_pool.pop(),
            buf_pos: 0,
            block_len: 0,
            cur_block_start: start,
            next_block_start: start,
            decoder: Decoder::new(),
            uncompressed_pool,
            compressed_pool,
        }
    }

    fn available(&self) -> usize {
        self.block_len - self.buf_pos
    }

    fn fetch_block(&mut self) -> Result<()> {
        let compressed_len = varint::read(&mut self.source).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::corrupt_block("data ended where a block was expected"),
            io::ErrorKind::InvalidData => Error::corrupt_block("bad block length prefix"),
            _ => Error::Io(e),
        })?;

        if compressed_len > self.compressed.len() as u64 {
            return Err(Error::corrupt_block(format!(
                "block at {} declares {} compressed bytes, limit is {}",
                self.next_block_start,
                compressed_len,
                self.compressed.len()
            )));
        }
        let compressed_len = compressed_len as usize;
        let frame = &mut self.compressed[..compressed_len];
        self.source.read_exact(frame).map_err(Error::from_block_read)?;

        let block_len = decompress_len(frame)
            .map_err(|e| Error::corrupt_block(format!("unreadable block header: {}", e)))?;
        if block_len > self.uncompressed.len() {
            return Err(Error::corrupt_block(format!(
                "block decompresses to {} bytes, limit is {}",
                block_len,
                self.uncompressed.len()
            )));
        }
        let block_len = self
            .decoder
            .decompress(frame, &mut self.uncompressed)
            .map_err(|e| Error::corrupt_block(format!("decompression failed: {}", e)))?;

        self.buf_pos = 0;
        self.block_len = block_len;
        self.cur_block_start = self.next_block_start;
        self.next_block_start = self.cur_block_start
            + varint::encoded_len(compressed_len as u64) as u64
            + compressed_len as u64;
        Ok(())
    }

    /// Fetch blocks until at least one byte is buffered.
    fn fill(&mut self) -> Result<()> {
        while self.buf_pos == self.block_len {
            self.fetch_block()?;
        }
        Ok(())
    }
}

impl<R: Read> BlockPositionedRead for SnappyBlockReader<R> {
    fn read_u8(&mut self) -> Result<u8> {
        self.fill()?;
        let b = self.uncompressed[self.buf_pos];
        self.buf_pos += 1;
        Ok(b)
    }

    fn read_exact(&mut self, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            self.fill()?;
            let n = self.available().min(buf.len());
            buf[..n].copy_from_slice(&self.uncompressed[self.buf_pos..self.buf_pos + n]);
            self.buf_pos += n;
            buf = &mut buf[n..];
        }
        Ok(())
    }

    fn skip(&mut self, mut n: u64) -> Result<()> {
        while n > 0 {
            self.fill()?;
            let step = (self.available() as u64).min(n);
            self.buf_pos += step as usize;
            n -= step;
        }
        Ok(())
    }

    fn block_position(&self) -> u64 {
        if self.buf_pos == self.block_len {
            self.next_block_start
        } else {
            self.cur_block_start
        }
    }

    fn block_offset(&self) -> u64 {
        if self.buf_pos == self.block_len {
            0
        } else {
            self.buf_pos as u64
        }
    }
}

impl<R> Drop for SnappyBlockReader<R> {
    fn drop(&mut self) {
        self.uncompressed_pool.push(std::mem::take(&mut self.uncompressed));
        self.compressed_pool.push(std::mem::take(&mut self.compressed));
    }
}
