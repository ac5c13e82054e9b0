//! Block framing for the data region.
//!
//! Records are grouped into blocks. With snappy framing each block is
//!
//! ```text
//! [varint(compressed_len)][compressed bytes]
//! ```
//!
//! and holds at most `max_block_size` uncompressed bytes. Without compression
//! the records are simply concatenated and every record is its own position.
//!
//! Every block starts at the beginning of a record. A record that does not fit
//! in the space left may continue into the next block, and the block after it
//! then starts fresh. `should_flush` decides when to close a block early so
//! that small records are never split.
//!
//! Writers implement `BlockOutput`; readers implement `BlockPositionedRead`,
//! a byte stream that can also say where the block holding its cursor starts.

#[cfg(feature = "snappy")]
pub mod snappy_reader;
#[cfg(feature = "snappy")]
pub mod snappy_writer;
pub mod uncompressed;

#[cfg(feature = "snappy")]
pub use snappy_reader::SnappyBlockReader;
#[cfg(feature = "snappy")]
pub use snappy_writer::SnappyBlockWriter;
pub use uncompressed::{UncompressedBlockReader, UncompressedBlockWriter};

use crate::config::CompressionType;
use crate::error::{Error, Result};
use crate::pool::BufferPoolRegistry;
use std::fs::File;
use std::io::{self, BufWriter, Cursor, Read, Seek, SeekFrom, Write};

/// Size of the scratch buffer used to stream values into a block.
pub const COPY_BUFFER_LEN: usize = 64 * 1024;

/// A byte sink that can force its contents to durable storage.
///
/// Sinks that know their offset and can be cut back let a writer undo a
/// record that failed half way. The default methods report that as
/// unsupported.
pub trait SyncWrite: Write {
    /// Flush buffered bytes and make them durable.
    fn sync(&mut self) -> io::Result<()>;

    /// Offset the next byte will be written at.
    fn sink_offset(&mut self) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "sink offset unknown"))
    }

    /// Drop everything from `len` on and continue writing there.
    fn truncate_to(&mut self, _len: u64) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "sink cannot be truncated"))
    }
}

impl SyncWrite for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn sink_offset(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

impl<W: SyncWrite> SyncWrite for BufWriter<W> {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.get_mut().sync()
    }

    fn sink_offset(&mut self) -> io::Result<u64> {
        let buffered = self.buffer().len() as u64;
        Ok(self.get_mut().sink_offset()? + buffered)
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.flush()?;
        self.get_mut().truncate_to(len)
    }
}

impl SyncWrite for Vec<u8> {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn sink_offset(&mut self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.truncate(len as usize);
        Ok(())
    }
}

impl SyncWrite for Cursor<Vec<u8>> {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn sink_offset(&mut self) -> io::Result<u64> {
        Ok(self.position())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().truncate(len as usize);
        self.set_position(len);
        Ok(())
    }
}

/// Writer side of the block layer.
///
/// A record call that fails either leaves no trace of the record or latches
/// the writer, after which record calls and flushes return `FailedWriter`.
pub trait BlockOutput<W> {
    /// Append a key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Append a key whose value is streamed from `value`.
    ///
    /// Exactly `value_len` bytes are copied; a shorter source is an I/O error.
    fn put_stream(&mut self, key: &[u8], value: &mut dyn Read, value_len: u64) -> Result<()>;

    /// Append a tombstone for `key`.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Push pending bytes to the sink, syncing if `fsync` is set.
    fn flush(&mut self, fsync: bool) -> Result<()>;

    /// Flush and refuse further records.
    fn close(&mut self, fsync: bool) -> Result<()>;

    /// The underlying sink.
    fn sink_mut(&mut self) -> &mut W;

    /// Number of framed blocks written so far.
    fn num_blocks(&self) -> u64;

    /// Largest number of records that started in a single block.
    fn max_entries_per_block(&self) -> usize;
}

/// Reader side of the block layer.
pub trait BlockPositionedRead {
    /// Read one byte.
    fn read_u8(&mut self) -> Result<u8>;

    /// Fill `buf` completely, crossing block boundaries as needed.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Discard `n` bytes.
    fn skip(&mut self, n: u64) -> Result<()>;

    /// Sink offset of the block the next byte comes from.
    ///
    /// Once the current block is used up this is the start of the next block.
    fn block_position(&self) -> u64;

    /// Bytes already consumed from the block at `block_position`.
    fn block_offset(&self) -> u64;

    /// Read a varint.
    fn read_varint(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let b = self.read_u8()?;
            result |= ((b & 0x7F) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 64 {
                return Err(Error::corrupt_block("varint too long"));
            }
        }
    }
}

/// Turn a crate error back into an I/O error for `std::io` adapters.
pub(crate) fn into_io(err: Error) -> io::Error {
    match err {
        Error::Io(e) => e,
        other => io::Error::other(other),
    }
}

/// Block-packing policy.
///
/// Flush when the record header would not fit in the `remaining` space, or
/// when the record does not fit but would fit in the space a fresh block adds.
/// Otherwise keep filling the current block.
pub fn should_flush(
    remaining: usize,
    header_size: usize,
    total_size: u64,
    max_block_size: usize,
) -> bool {
    if remaining < header_size {
        return true;
    }
    (remaining as u64) < total_size && total_size < (max_block_size - remaining) as u64
}

/// Open a reader of the given framing over `source`.
///
/// `start` is the sink offset `source` is positioned at.
#[cfg_attr(not(feature = "snappy"), allow(unused_variables))]
pub fn new_reader<'a, R: Read + Send + 'a>(
    source: R,
    compression: CompressionType,
    max_block_size: usize,
    start: u64,
    pools: &BufferPoolRegistry,
) -> Box<dyn BlockPositionedRead + Send + 'a> {
    match compression {
        CompressionType::None => Box::new(UncompressedBlockReader::new(source, start)),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => {
            Box::new(SnappyBlockReader::new(source, max_block_size, start, pools))
        }
    }
}

/// Open a writer of the given framing over `sink`.
#[cfg_attr(not(feature = "snappy"), allow(unused_variables))]
pub fn new_writer<'a, W: SyncWrite + Send + 'a>(
    sink: W,
    compression: CompressionType,
    max_block_size: usize,
    pools: &BufferPoolRegistry,
) -> Box<dyn BlockOutput<W> + Send + 'a> {
    match compression {
        CompressionType::None => Box::new(UncompressedBlockWriter::new(sink, pools)),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => Box::new(SnappyBlockWriter::new(sink, max_block_size, pools)),
    }
}
