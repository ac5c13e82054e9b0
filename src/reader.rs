//! Data file reader.
//!
//! `HosReader` answers key lookups through the hash index of a finished data
//! file. `LogIterator` walks the records in write order, tombstones included.

use crate::block::{self, BlockPositionedRead};
use crate::config::{CompressionType, Options};
use crate::error::{Error, Result};
use crate::index::{
    key_hash, stride_hash, DataRegion, Footer, IndexInfo, KeyMatch, Probe, RecordPosition,
    SlotLayout, FOOTER_LEN,
};
use crate::object::ObjectMeta;
use crate::pool::BufferPoolRegistry;
use crate::record::{self, LogEntry};
use crate::store::ChunkedStore;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sequential reader over the records of a data region.
pub struct LogIterator<'a> {
    reader: Box<dyn BlockPositionedRead + Send + 'a>,
    end: u64,
    done: bool,
}

impl<'a> LogIterator<'a> {
    pub(crate) fn new(reader: Box<dyn BlockPositionedRead + Send + 'a>, end: u64) -> Self {
        Self { reader, end, done: false }
    }

    /// Next record together with where it starts.
    ///
    /// The first error ends the iteration.
    pub fn next_positioned(&mut self) -> Option<Result<(RecordPosition, LogEntry)>> {
        if self.done || self.reader.block_position() >= self.end {
            self.done = true;
            return None;
        }

        let position = RecordPosition {
            block_position: self.reader.block_position(),
            offset: self.reader.block_offset() as u32,
        };
        match record::read_entry(&mut *self.reader) {
            Ok(entry) => Some(Ok((position, entry))),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl LogIterator<'static> {
    fn over_file(
        file: File,
        end: u64,
        compression: CompressionType,
        max_block_size: usize,
        pools: &BufferPoolRegistry,
    ) -> Self {
        let source = BufReader::new(file.take(end));
        Self::new(block::new_reader(source, compression, max_block_size, 0, pools), end)
    }

    /// Scan a file with no index, treating all of it as records written with
    /// `options`' framing.
    pub fn open_unindexed<P: AsRef<Path>>(path: P, options: &Options) -> Result<Self> {
        options.validate()?;
        let file = File::open(path)?;
        let end = file.metadata()?.len();
        Ok(Self::over_file(
            file,
            end,
            options.compression,
            options.max_block_size,
            &options.buffer_pools,
        ))
    }
}

impl Iterator for LogIterator<'_> {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_positioned().map(|item| item.map(|(_, entry)| entry))
    }
}

struct ReaderState {
    region: DataRegion,
    table: ChunkedStore,
    /// Set once a lookup hit corrupt data; the file is not trusted after that.
    poisoned: bool,
}

/// HosReader provides random and sequential access to an indexed data file.
///
/// Usage:
/// ```no_run
/// use hosdb::HosReader;
///
/// let reader = HosReader::open("objects.hos").unwrap();
/// if let Some(value) = reader.get(b"key1").unwrap() {
///     println!("Found: {:?}", value);
/// }
/// ```
///
/// Lookups from several threads are serialised on an internal lock.
pub struct HosReader {
    path: PathBuf,
    footer: Footer,
    pools: Arc<BufferPoolRegistry>,
    state: Mutex<ReaderState>,
}

impl HosReader {
    /// Open an indexed data file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, &Options::default())
    }

    /// Open an indexed data file, taking the buffer pools from `options`.
    ///
    /// Framing and hash width always come from the file's footer.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: &Options) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;

        let file_size = file.metadata()?.len();
        if file_size < FOOTER_LEN as u64 {
            return Err(Error::corruption("File too small to be an indexed data file"));
        }
        file.seek(SeekFrom::End(-(FOOTER_LEN as i64)))?;
        let footer = Footer::read_from(&mut file)?;

        let layout = SlotLayout::new(footer.hash_type);
        let table_len = footer
            .slot_count
            .checked_mul(layout.slot_len() as u64)
            .ok_or_else(|| Error::corruption("index table size overflows"))?;
        let expected_size = footer
            .index_offset
            .checked_add(table_len)
            .and_then(|n| n.checked_add(FOOTER_LEN as u64));
        if footer.index_offset != footer.data_end || expected_size != Some(file_size) {
            return Err(Error::corruption(format!(
                "footer describes {} data bytes and {} index bytes, file has {}",
                footer.data_end, table_len, file_size
            )));
        }
        if footer.max_block_size == 0 {
            return Err(Error::corruption("footer declares a zero block size"));
        }

        let mut table = ChunkedStore::new(table_len)?;
        file.seek(SeekFrom::Start(footer.index_offset))?;
        table.load_from(&mut BufReader::new((&file).take(table_len)))?;

        let pools = Arc::clone(&options.buffer_pools);
        let region = DataRegion::new(
            file,
            footer.data_end,
            footer.compression,
            footer.max_block_size as usize,
            Arc::clone(&pools),
        );

        log::info!(
            "Opened data file {:?}: {} records, {} live keys, {} slots",
            path,
            footer.num_records,
            footer.num_live,
            footer.slot_count
        );

        Ok(Self {
            path,
            footer,
            pools,
            state: Mutex::new(ReaderState { region, table, poisoned: false }),
        })
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Counts and hash width of the index.
    pub fn index_info(&self) -> IndexInfo {
        IndexInfo {
            slot_count: self.footer.slot_count,
            hash_type: self.footer.hash_type,
            num_records: self.footer.num_records,
            num_live: self.footer.num_live,
        }
    }

    /// Block framing of the data region.
    pub fn compression(&self) -> CompressionType {
        self.footer.compression
    }

    /// Value of the most recent put for `key`, or `None` if the key was
    /// never written or its latest record is a tombstone.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.find(key, true)? {
            KeyMatch::Present(value) => Ok(value),
            _ => Ok(None),
        }
    }

    /// Get a UTF-8 value by string key.
    pub fn get_str(&self, key: &str) -> Result<Option<String>> {
        match self.get(key.as_bytes())? {
            Some(value) => String::from_utf8(value).map(Some).map_err(|e| {
                Error::Serialization(format!("value for {:?} is not UTF-8: {}", key, e))
            }),
            None => Ok(None),
        }
    }

    /// Whether `key` is present and not deleted.
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(matches!(self.find(key, false)?, KeyMatch::Present(_)))
    }

    /// Fetch object metadata stored with `HosWriter::put_object`.
    pub fn get_object(&self, key: &str) -> Result<Option<ObjectMeta>> {
        self.get(key.as_bytes())?.map(|value| ObjectMeta::decode(&value)).transpose()
    }

    /// Iterate over every record in write order.
    ///
    /// The iterator has its own file handle and does not block lookups.
    pub fn entries(&self) -> Result<LogIterator<'static>> {
        let file = File::open(&self.path)?;
        Ok(LogIterator::over_file(
            file,
            self.footer.data_end,
            self.footer.compression,
            self.footer.max_block_size as usize,
            &self.pools,
        ))
    }

    fn find(&self, key: &[u8], read_value: bool) -> Result<KeyMatch> {
        let hash_type = self.footer.hash_type;
        let layout = SlotLayout::new(hash_type);
        let hash = key_hash(key, hash_type);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.poisoned {
            return Err(Error::corruption(format!(
                "{:?} hit corrupt data earlier and must be reopened",
                self.path
            )));
        }

        let result = Self::probe(state, &layout, hash, key, read_value, self.footer.slot_count);
        if matches!(result, Err(Error::CorruptBlock(_)) | Err(Error::OutOfRange(_))) {
            state.poisoned = true;
        }
        result
    }

    fn probe(
        state: &mut ReaderState,
        layout: &SlotLayout,
        hash: u64,
        key: &[u8],
        read_value: bool,
        slots: u64,
    ) -> Result<KeyMatch> {
        for index in Probe::new(hash, stride_hash(key), slots) {
            match layout.read_slot(&mut state.table, index)? {
                None => break,
                Some(slot) if slot.hash == hash => {
                    match state.region.match_at(slot.position, key, read_value)? {
                        KeyMatch::Other => {}
                        found => return Ok(found),
                    }
                }
                Some(_) => {}
            }
        }
        Ok(KeyMatch::Other)
    }
}

impl std::fmt::Debug for HosReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HosReader")
            .field("path", &self.path)
            .field("footer", &self.footer)
            .finish()
    }
}
