//! Unframed records: the block layer without blocks.
//!
//! Records are concatenated directly in the sink, so every record position is
//! an exact byte offset and the intra-block offset is always zero.

use super::{BlockOutput, BlockPositionedRead, SyncWrite, COPY_BUFFER_LEN};
use crate::error::{Error, Result};
use crate::pool::{BufferPool, BufferPoolRegistry, MemoryKind};
use crate::record::{self, HeaderBuf};
use crate::varint;
use std::io::{self, Read};
use std::sync::Arc;

/// Writes records straight to the sink.
pub struct UncompressedBlockWriter<W: SyncWrite> {
    sink: W,
    copy_pool: Arc<BufferPool>,
    closed: bool,
    /// A record was left half written in the sink.
    failed: bool,
}

impl<W: SyncWrite> UncompressedBlockWriter<W> {
    /// Create a writer over `sink`.
    pub fn new(sink: W, pools: &BufferPoolRegistry) -> Self {
        Self {
            sink,
            copy_pool: pools.get(COPY_BUFFER_LEN, MemoryKind::Heap),
            closed: false,
            failed: false,
        }
    }

    /// Consume the writer and return the sink.
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

    /// Write one record through `body`, cutting the sink back to the record
    /// start if it fails. A sink that cannot be cut back latches the writer.
    fn write_entry<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut W) -> Result<()>,
    {
        self.ensure_open()?;
        let start = self.sink.sink_offset().ok();

        if let Err(e) = body(&mut self.sink) {
            let undone = match start {
                Some(start) => self.sink.truncate_to(start).is_ok(),
                None => false,
            };
            if !undone {
                log::warn!("Could not remove a partial record, writer is unusable: {}", e);
                self.failed = true;
            }
            return Err(e);
        }
        Ok(())
    }
}

impl<W: SyncWrite> BlockOutput<W> for UncompressedBlockWriter<W> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut header = HeaderBuf::default();
        let n = record::encode_put_header(&mut header, key.len() as u64, value.len() as u64);
        self.write_entry(|sink| {
            sink.write_all(&header[..n])?;
            sink.write_all(key)?;
            sink.write_all(value)?;
            Ok(())
        })
    }

    fn put_stream(&mut self, key: &[u8], value: &mut dyn Read, value_len: u64) -> Result<()> {
        let mut header = HeaderBuf::default();
        let n = record::encode_put_header(&mut header, key.len() as u64, value_len);
        let pool = Arc::clone(&self.copy_pool);
        self.write_entry(|sink| {
            sink.write_all(&header[..n])?;
            sink.write_all(key)?;

            let mut scratch = pool.pop();
            let copied = varint::copy(value_len, value, sink, &mut scratch);
            pool.push(scratch);
            Ok(copied?)
        })
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        let mut header = HeaderBuf::default();
        let n = record::encode_delete_header(&mut header, key.len() as u64);
        self.write_entry(|sink| {
            sink.write_all(&header[..n])?;
            sink.write_all(key)?;
            Ok(())
        })
    }

    fn flush(&mut self, fsync: bool) -> Result<()> {
        if self.failed {
            return Err(Error::FailedWriter);
        }
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
        0
    }

    fn max_entries_per_block(&self) -> usize {
        0
    }
}

/// Reads unframed records, tracking the running byte offset.
pub struct UncompressedBlockReader<R> {
    source: R,
    position: u64,
}

impl<R: Read> UncompressedBlockReader<R> {
    /// Create a reader over `source`, which sits at sink offset `start`.
    pub fn new(source: R, start: u64) -> Self {
        Self { source, position: start }
    }
}

impl<R: Read> BlockPositionedRead for UncompressedBlockReader<R> {
    fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.source.read_exact(buf).map_err(Error::from_block_read)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.source).take(n), &mut io::sink())?;
        self.position += skipped;
        if skipped < n {
            return Err(Error::corrupt_block(format!(
                "skip of {} bytes ran out after {}",
                n, skipped
            )));
        }
        Ok(())
    }

    fn block_position(&self) -> u64 {
        self.position
    }

    fn block_offset(&self) -> u64 {
        0
    }
}
