//! # HosDb - An Append-Only Constant Key-Value Data File
//!
//! HosDb stores small-object metadata in a write-once data file and answers
//! random lookups with a single hash probe sequence, in the spirit of CDB.
//!
//! ## Architecture
//!
//! The data file is made of several layers:
//!
//! - **Records**: puts and tombstones in a varint-framed wire form
//! - **Blocks**: records grouped into snappy-compressed blocks (or left unframed)
//! - **Hash Index**: an open-addressed table staged in a chunked in-memory store
//! - **Footer**: fixed-size trailer locating the data end and the index
//! - **Buffer Pools**: reusable block and copy buffers shared between writers and readers
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use hosdb::{HosReader, HosWriter, Options};
//!
//! # fn main() -> Result<(), hosdb::Error> {
//! // Write records, then index them
//! let mut writer = HosWriter::create("./objects.hos", Options::default())?;
//! writer.put(b"key1", b"value1")?;
//! writer.put(b"key2", b"value2")?;
//! writer.delete(b"key1")?;
//! writer.build_index()?;
//! writer.close()?;
//!
//! // Random lookups
//! let reader = HosReader::open("./objects.hos")?;
//! assert!(reader.get(b"key1")?.is_none());
//! if let Some(value) = reader.get(b"key2")? {
//!     println!("Found: {:?}", value);
//! }
//!
//! // Sequential scan in write order
//! for entry in reader.entries()? {
//!     println!("{:?}", entry?);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod block;
pub mod config;
pub mod error;
pub mod index;
pub mod object;
pub mod pool;
pub mod reader;
pub mod record;
pub mod store;
pub mod varint;
pub mod writer;

// Re-exports
pub use config::{CompressionType, HashType, Options};
pub use error::{Error, Result};
pub use index::IndexInfo;
pub use object::ObjectMeta;
pub use pool::{BufferPool, BufferPoolRegistry, MemoryKind};
pub use reader::{HosReader, LogIterator};
pub use record::LogEntry;
pub use store::ChunkedStore;
pub use writer::HosWriter;
