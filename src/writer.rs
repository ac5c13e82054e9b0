//! Data file writer.

use crate::block::{self, BlockOutput, SyncWrite};
use crate::config::{effective_sparsity, HashType, Options};
use crate::error::{Error, Result};
use crate::index::{BuiltIndex, DataRegion, Footer, IndexBuilder, IndexInfo, FOOTER_LEN};
use crate::object::ObjectMeta;
use crate::reader::LogIterator;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Buffered file sink that tracks its offset and can cut the file back.
pub struct DataSink {
    writer: BufWriter<File>,
    position: u64,
    #[cfg(test)]
    syncs: usize,
}

impl DataSink {
    fn new(file: File, position: u64) -> Self {
        Self {
            writer: BufWriter::new(file),
            position,
            #[cfg(test)]
            syncs: 0,
        }
    }

    /// Offset the next byte will be written at.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Drop everything from `len` on and continue writing there.
    fn truncate(&mut self, len: u64) -> Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(len)?;
        file.seek(SeekFrom::Start(len))?;
        self.position = len;
        Ok(())
    }
}

impl Write for DataSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl SyncWrite for DataSink {
    fn sync(&mut self) -> io::Result<()> {
        #[cfg(test)]
        {
            self.syncs += 1;
        }
        self.writer.sync()
    }

    fn sink_offset(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.truncate(len).map_err(block::into_io)
    }
}

/// Appends records to a data file and builds its hash index.
///
/// Usage:
/// ```no_run
/// use hosdb::{HosWriter, Options};
///
/// let mut writer = HosWriter::create("objects.hos", Options::default()).unwrap();
/// writer.put(b"key1", b"value1").unwrap();
/// writer.delete(b"key0").unwrap();
/// writer.build_index().unwrap();
/// writer.close().unwrap();
/// ```
///
/// A writer is used from one thread at a time. A put or delete that fails
/// is removed again when the bytes it wrote can still be taken back. When
/// they cannot, every later call returns `FailedWriter`.
pub struct HosWriter {
    path: PathBuf,
    options: Options,
    output: Box<dyn BlockOutput<DataSink> + Send>,
    /// Records in the data region, including earlier sessions.
    num_records: u64,
    num_puts: u64,
    num_deletes: u64,
    data_end: u64,
    /// An index and footer follow `data_end` and must be cut before appending.
    has_trailer: bool,
    closed: bool,
}

impl HosWriter {
    /// Create a new data file, replacing any existing one.
    pub fn create<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        log::info!("Creating data file {:?}", path);
        Ok(Self::with_file(path, file, 0, options, 0, 0, false))
    }

    /// Reopen a data file to add more records.
    ///
    /// An indexed file keeps its framing and block size, whatever `options`
    /// say; its index is dropped on the first new record. A file without a
    /// footer is scanned with `options`' framing to count its records. A
    /// missing file is created.
    pub fn append<P: AsRef<Path>>(path: P, mut options: Options) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        let file_size = file.metadata()?.len();

        let (data_end, num_records, has_trailer) = match Self::read_footer(&mut file, file_size)? {
            Some(footer) => {
                options.compression = footer.compression;
                options.max_block_size = footer.max_block_size as usize;
                (footer.data_end, footer.num_records, true)
            }
            None => {
                let mut count = 0u64;
                for entry in LogIterator::open_unindexed(&path, &options)? {
                    entry?;
                    count += 1;
                }
                (file_size, count, false)
            }
        };
        file.seek(SeekFrom::Start(file_size))?;

        log::info!(
            "Appending to data file {:?}: {} records, {}",
            path,
            num_records,
            if has_trailer { "indexed" } else { "not indexed" }
        );
        Ok(Self::with_file(path, file, file_size, options, num_records, data_end, has_trailer))
    }

    fn with_file(
        path: PathBuf,
        file: File,
        position: u64,
        options: Options,
        num_records: u64,
        data_end: u64,
        has_trailer: bool,
    ) -> Self {
        let output = block::new_writer(
            DataSink::new(file, position),
            options.compression,
            options.max_block_size,
            &options.buffer_pools,
        );
        Self {
            path,
            options,
            output,
            num_records,
            num_puts: 0,
            num_deletes: 0,
            data_end,
            has_trailer,
            closed: false,
        }
    }

    /// The footer at the end of `file`, or `None` if the file does not end
    /// with one.
    fn read_footer(file: &mut File, file_size: u64) -> Result<Option<Footer>> {
        if file_size < FOOTER_LEN as u64 {
            return Ok(None);
        }
        let mut buf = [0u8; FOOTER_LEN];
        file.seek(SeekFrom::Start(file_size - FOOTER_LEN as u64))?;
        file.read_exact(&mut buf)?;
        if !Footer::has_magic(&buf) {
            return Ok(None);
        }

        let footer = Footer::decode(&buf)?;
        if footer.data_end > file_size - FOOTER_LEN as u64 {
            return Err(Error::corruption(format!(
                "footer places data end at {} in a file of {} bytes",
                footer.data_end, file_size
            )));
        }
        Ok(Some(footer))
    }

    fn begin_record(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::ClosedWriter);
        }
        self.cut_trailer()
    }

    fn cut_trailer(&mut self) -> Result<()> {
        if self.has_trailer {
            self.output.sink_mut().truncate(self.data_end)?;
            self.has_trailer = false;
            log::debug!("Removed index of {:?} at {}", self.path, self.data_end);
        }
        Ok(())
    }

    /// Append a key-value pair.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.begin_record()?;
        self.output.put(key, value)?;
        self.num_puts += 1;
        self.num_records += 1;
        Ok(())
    }

    /// Append a string key-value pair.
    pub fn put_str(&mut self, key: &str, value: &str) -> Result<()> {
        self.put(key.as_bytes(), value.as_bytes())
    }

    /// Append a key whose value is read from `value`.
    ///
    /// Exactly `value_len` bytes are copied, without buffering the whole value.
    /// A source that ends early fails with an I/O error and the record is
    /// dropped.
    pub fn put_stream(&mut self, key: &[u8], value: &mut dyn Read, value_len: u64) -> Result<()> {
        self.begin_record()?;
        self.output.put_stream(key, value, value_len)?;
        self.num_puts += 1;
        self.num_records += 1;
        Ok(())
    }

    /// Append object metadata under a string key.
    pub fn put_object(&mut self, key: &str, meta: &ObjectMeta) -> Result<()> {
        let value = meta.encode()?;
        self.put(key.as_bytes(), &value)
    }

    /// Append a tombstone for `key`.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.begin_record()?;
        self.output.delete(key)?;
        self.num_deletes += 1;
        self.num_records += 1;
        Ok(())
    }

    /// Append a tombstone for a string key.
    pub fn delete_str(&mut self, key: &str) -> Result<()> {
        self.delete(key.as_bytes())
    }

    /// Push pending records to the file, syncing if durability is on.
    pub fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::ClosedWriter);
        }
        self.output.flush(self.options.fsync)
    }

    /// Flush and release the file. Later writes fail with `ClosedWriter`.
    ///
    /// Closing does not build an index.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.output.close(self.options.fsync)?;
        self.closed = true;
        log::info!(
            "Closed data file {:?}: {} puts, {} deletes, {} blocks",
            self.path,
            self.num_puts,
            self.num_deletes,
            self.output.num_blocks()
        );
        Ok(())
    }

    /// Build the hash index over every record written so far and append it,
    /// followed by the footer.
    ///
    /// Each call rebuilds the whole index. Records written afterwards are
    /// only indexed by a later call.
    pub fn build_index(&mut self) -> Result<IndexInfo> {
        if self.closed {
            return Err(Error::ClosedWriter);
        }
        self.cut_trailer()?;
        self.output.flush(false)?;

        let data_end = self.output.sink_mut().position();
        let region = DataRegion::new(
            File::open(&self.path)?,
            data_end,
            self.options.compression,
            self.options.max_block_size,
            Arc::clone(&self.options.buffer_pools),
        );
        let builder = IndexBuilder::new(self.options.hash_type, self.options.sparsity);
        let BuiltIndex { mut table, info } = builder.build(&region, self.num_records)?;

        let footer = Footer {
            compression: self.options.compression,
            hash_type: info.hash_type,
            max_block_size: self.options.max_block_size as u32,
            data_end,
            index_offset: data_end,
            slot_count: info.slot_count,
            num_records: info.num_records,
            num_live: info.num_live,
        };

        self.data_end = data_end;
        self.has_trailer = true;
        let sink = self.output.sink_mut();
        table.flush_to(sink)?;
        table.close();
        footer.write_to(sink)?;
        self.output.flush(self.options.fsync)?;

        Ok(info)
    }

    /// Sets whether flush and index builds force data to disk.
    pub fn set_durability_on_flush(&mut self, fsync: bool) {
        self.options.fsync = fsync;
    }

    /// Sets the hash width of later index builds.
    pub fn set_hash_width(&mut self, hash_type: HashType) {
        self.options.hash_type = hash_type;
    }

    /// Sets the index sparsity, clamped to the supported floor.
    pub fn set_index_sparsity(&mut self, sparsity: f64) {
        let effective = effective_sparsity(sparsity);
        if effective != sparsity {
            log::warn!("Index sparsity {} is below the floor, using {}", sparsity, effective);
        }
        self.options.sparsity = effective;
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Options in effect, including framing adopted from a reopened file.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Records in the file, tombstones and earlier sessions included.
    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    /// Puts made through this writer.
    pub fn num_puts(&self) -> u64 {
        self.num_puts
    }

    /// Deletes made through this writer.
    pub fn num_deletes(&self) -> u64 {
        self.num_deletes
    }

    /// Blocks framed by this writer.
    pub fn num_blocks(&self) -> u64 {
        self.output.num_blocks()
    }

    /// Largest number of records that started in one block.
    pub fn max_entries_per_block(&self) -> usize {
        self.output.max_entries_per_block()
    }
}

impl Drop for HosWriter {
    fn drop(&mut self) {
        // Best effort flush on drop
        if !self.closed {
            if let Err(e) = self.output.close(self.options.fsync) {
                log::warn!("Failed to flush {:?} on drop: {}", self.path, e);
            }
        }
    }
}

impl std::fmt::Debug for HosWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HosWriter")
            .field("path", &self.path)
            .field("num_records", &self.num_records)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressionType;
    use crate::index::FOOTER_LEN;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_writer_create() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.hos");

        let writer = HosWriter::create(&path, Options::default()).unwrap();
        assert_eq!(writer.num_records(), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_invalid_options() {
        let temp_dir = TempDir::new().unwrap();
        let options = Options::default().max_block_size(0);
        let result = HosWriter::create(temp_dir.path().join("data.hos"), options);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_counts() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = HosWriter::create(temp_dir.path().join("data.hos"), Options::default())
            .unwrap();

        writer.put_str("a", "1").unwrap();
        writer.put_stream(b"b", &mut Cursor::new(b"22".to_vec()), 2).unwrap();
        writer.delete_str("a").unwrap();

        assert_eq!(writer.num_puts(), 2);
        assert_eq!(writer.num_deletes(), 1);
        assert_eq!(writer.num_records(), 3);
        #[cfg(feature = "snappy")]
        assert_eq!(writer.max_entries_per_block(), 3);
    }

    #[test]
    fn test_closed_writer() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = HosWriter::create(temp_dir.path().join("data.hos"), Options::default())
            .unwrap();
        writer.close().unwrap();
        writer.close().unwrap();

        assert!(matches!(writer.put(b"k", b"v"), Err(Error::ClosedWriter)));
        assert!(matches!(writer.delete(b"k"), Err(Error::ClosedWriter)));
        assert!(matches!(writer.flush(), Err(Error::ClosedWriter)));
        assert!(matches!(writer.build_index(), Err(Error::ClosedWriter)));
    }

    #[test]
    fn test_sparsity_clamped() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = HosWriter::create(temp_dir.path().join("data.hos"), Options::default())
            .unwrap();
        writer.set_index_sparsity(0.5);
        assert_eq!(writer.options().sparsity, 1.3);
        writer.set_index_sparsity(3.0);
        assert_eq!(writer.options().sparsity, 3.0);
    }

    #[test]
    fn test_file_layout_after_build() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.hos");
        let options = Options::default()
            .compression(CompressionType::None)
            .hash_type(HashType::Hash32);

        let mut writer = HosWriter::create(&path, options).unwrap();
        writer.put(b"a", b"1").unwrap();
        writer.put(b"b", b"2").unwrap();
        let info = writer.build_index().unwrap();
        writer.close().unwrap();

        assert_eq!(info.slot_count, 3);
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, 8 + 3 * 16 + FOOTER_LEN as u64);
    }

    #[test]
    fn test_rebuild_truncates_old_index() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.hos");
        let options = Options::default()
            .compression(CompressionType::None)
            .hash_type(HashType::Hash32);

        let mut writer = HosWriter::create(&path, options).unwrap();
        writer.put(b"a", b"1").unwrap();
        writer.build_index().unwrap();
        writer.build_index().unwrap();
        writer.put(b"b", b"2").unwrap();
        writer.flush().unwrap();

        // Old index and footer are gone; only the two records remain.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
    }

    #[test]
    fn test_durability_on_flush() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = HosWriter::create(temp_dir.path().join("data.hos"), Options::default())
            .unwrap();

        writer.put(b"a", b"1").unwrap();
        writer.flush().unwrap();
        writer.build_index().unwrap();
        assert_eq!(writer.output.sink_mut().syncs, 0);

        writer.set_durability_on_flush(true);
        writer.put(b"b", b"2").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.output.sink_mut().syncs, 1);
        writer.build_index().unwrap();
        assert_eq!(writer.output.sink_mut().syncs, 2);
        writer.close().unwrap();
        assert_eq!(writer.output.sink_mut().syncs, 3);
    }

    #[test]
    fn test_short_stream_rolled_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.hos");
        let options = Options::default().compression(CompressionType::None);

        let mut writer = HosWriter::create(&path, options).unwrap();
        writer.put(b"a", b"1").unwrap();
        assert!(writer.put_stream(b"k", &mut Cursor::new(vec![0u8; 3]), 9).is_err());
        writer.flush().unwrap();

        assert_eq!(writer.num_records(), 1);
        assert_eq!(writer.num_puts(), 1);
        assert_eq!(writer.output.sink_mut().position(), 4);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4);
    }

    #[test]
    fn test_drop_flushes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.hos");
        {
            let mut writer = HosWriter::create(&path, Options::default()).unwrap();
            writer.put(b"key", b"value").unwrap();
        }
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
