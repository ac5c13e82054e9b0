//! Snappy block writer.

use super::{into_io, should_flush, BlockOutput, SyncWrite, COPY_BUFFER_LEN};
use crate::error::{Error, Result};
use crate::pool::{BufferPool, BufferPoolRegistry, MemoryKind};
use crate::record::{self, HeaderBuf};
use crate::varint;
use bytes::BytesMut;
use snap::raw::{max_compress_len, Encoder};
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Accumulates records into blocks of at most `max_block_size` bytes and
/// writes each block snappy-compressed with a varint length prefix.
pub struct SnappyBlockWriter<W: SyncWrite> {
    sink: W,
    pending: BytesMut,
    max_block_size: usize,
    encoder: Encoder,
    compressed_pool: Arc<BufferPool>,
    copy_pool: Arc<BufferPool>,
    /// A block was emitted since the current record started.
    flushed: bool,
    current_entries: usize,
    max_entries_per_block: usize,
    num_blocks: u64,
    closed: bool,
    /// A record was left half written; nothing more may be appended.
    failed: bool,
}

/// `io::Write` view of the pending block, for streamed values.
struct BlockStream<'a, W: SyncWrite>(&'a mut SnappyBlockWriter<W>);

impl<W: SyncWrite> Write for BlockStream<'_, W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.write_bytes(data).map_err(into_io)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: SyncWrite> SnappyBlockWriter<W> {
    /// Create a writer over `sink`.
    ///
    /// Panics if `max_block_size` is zero or too large for snappy.
    pub fn new(sink: W, max_block_size: usize, pools: &BufferPoolRegistry) -> Self {
        let compressed_len = max_compress_len(max_block_size);
        assert!(
            max_block_size > 0 && compressed_len > 0,
            "invalid snappy block size {}",
            max_block_size
        );

        Self {
            sink,
            pending: BytesMut::with_capacity(max_block_size),
            max_block_size,
            encoder: Encoder::new(),
            compressed_pool: pools.get(compressed_len, MemoryKind::Direct),
            copy_pool: pools.get(COPY_BUFFER_LEN, MemoryKind::Heap),
            flushed: false,
            current_entries: 0,
            max_entries_per_block: 0,
            num_blocks: 0,
            closed: false,
            failed: false,
        }
    }

    /// Space left in the current block.
    pub fn remaining(&self) -> usize {
        self.max_block_size - self.pending.len()
    }

    /// Bytes waiting in the current block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Consume the writer and return the sink. Pending bytes are dropped.
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::ClosedWriter);
        }
        if self.failed {
            return Err(Error::FailedWriter);
        }
        Ok(())
    }

    fn write_bytes(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = self.remaining().min(data.len());
            self.pending.extend_from_slice(&data[..n]);
            data = &data[n..];
            if self.remaining() == 0 {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut compressed = self.compressed_pool.pop();
        let written = Self::frame(&mut self.encoder, &self.pending, &mut compressed, &mut self.sink);
        self.compressed_pool.push(compressed);
        let compressed_len = match written {
            Ok(len) => len,
            Err(e) => {
                // The sink may hold part of the frame.
                self.failed = true;
                return Err(e);
            }
        };

        log::debug!(
            "Flushed block {}: {} bytes -> {} bytes, {} entries",
            self.num_blocks,
            self.pending.len(),
            compressed_len,
            self.current_entries
        );

        self.pending.clear();
        self.num_blocks += 1;
        self.max_entries_per_block = self.max_entries_per_block.max(self.current_entries);
        self.current_entries = 0;
        self.flushed = true;
        Ok(())
    }

    fn frame(encoder: &mut Encoder, block: &[u8], scratch: &mut [u8], sink: &mut W) -> Result<usize> {
        let len = encoder
            .compress(block, scratch)
            .map_err(|e| Error::Io(io::Error::other(e)))?;
        varint::write(len as u64, sink)?;
        sink.write_all(&scratch[..len])?;
        Ok(len)
    }

    /// Write one record through `body`.
    ///
    /// If `body` fails before any of the record left the pending block, the
    /// record is cut from the block. Otherwise the writer is latched.
    fn write_entry<F>(&mut self, header_size: usize, total_size: u64, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.ensure_open()?;
        if should_flush(self.remaining(), header_size, total_size, self.max_block_size) {
            self.flush_block()?;
        }

        let start = self.pending.len();
        let blocks_before = self.num_blocks;
        self.flushed = false;
        self.current_entries += 1;

        if let Err(e) = body(self) {
            if !self.failed && self.num_blocks == blocks_before {
                self.pending.truncate(start);
                self.current_entries -= 1;
            } else {
                self.failed = true;
            }
            return Err(e);
        }

        // A record that overflowed into a new block gets its tail flushed on
        // its own, so the next block starts with the next record.
        if self.flushed && !self.pending.is_empty() {
            self.flush_block()?;
        }
        Ok(())
    }
}

impl<W: SyncWrite> BlockOutput<W> for SnappyBlockWriter<W> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let (key_len, value_len) = (key.len() as u64, value.len() as u64);
        let mut header = HeaderBuf::default();
        let header_len = record::encode_put_header(&mut header, key_len, value_len);

        self.write_entry(header_len, header_len as u64 + key_len + value_len, |w| {
            w.write_bytes(&header[..header_len])?;
            w.write_bytes(key)?;
            w.write_bytes(value)
        })
    }

    fn put_stream(&mut self, key: &[u8], value: &mut dyn Read, value_len: u64) -> Result<()> {
        let key_len = key.len() as u64;
        let mut header = HeaderBuf::default();
        let header_len = record::encode_put_header(&mut header, key_len, value_len);

        let pool = Arc::clone(&self.copy_pool);
        self.write_entry(header_len, header_len as u64 + key_len + value_len, |w| {
            w.write_bytes(&header[..header_len])?;
            w.write_bytes(key)?;

            let mut scratch = pool.pop();
            let copied = varint::copy(value_len, value, &mut BlockStream(&mut *w), &mut scratch);
            pool.push(scratch);
            Ok(copied?)
        })
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        let key_len = key.len() as u64;
        let reserve = record::delete_header_reserve(key_len);
        let mut header = HeaderBuf::default();
        let header_len = record::encode_delete_header(&mut header, key_len);

        self.write_entry(reserve, reserve as u64 + key_len, |w| {
            w.write_bytes(&header[..header_len])?;
            w.write_bytes(key)
        })
    }

    fn flush(&mut self, fsync: bool) -> Result<()> {
        if self.failed {
            return Err(Error::FailedWriter);
        }
        self.flush_block()?;
        self.sink.flush()?;
        if fsync {
            self.sink.sync()?;
        }
        Ok(())
    }

    fn close(&mut self, fsync: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush(fsync)?;
        self.closed = true;
        Ok(())
    }

    fn sink_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    fn num_blocks(&self) -> u64 {
        self.num_blocks
    }

    fn max_entries_per_block(&self) -> usize {
        self.max_entries_per_block.max(self.current_entries)
    }
}
