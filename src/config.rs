//! Configuration options for HOS data files.

use crate::pool::BufferPoolRegistry;
use std::sync::Arc;

/// Default uncompressed block size (4KB)
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 4 * 1024;

/// Sparsity floor for the hash index. Lower values make collision chains too long.
pub const MIN_SPARSITY: f64 = 1.3;

/// Record count at which `HashType::Auto` switches to 64-bit hashes.
const AUTO_HASH64_THRESHOLD: u64 = 1 << 23;

/// Configuration options for writing and reading a data file.
#[derive(Debug, Clone)]
pub struct Options {
    /// Block framing used for records.
    /// Default: CompressionType::Snappy
    pub compression: CompressionType,

    /// Capacity of an uncompressed block (in bytes).
    /// Default: 4KB
    pub max_block_size: usize,

    /// Force data to disk on every flush and index build.
    /// Default: false
    pub fsync: bool,

    /// Hash width used by the index.
    /// Default: HashType::Auto
    pub hash_type: HashType,

    /// Index load factor. Values below 1.3 are clamped to 1.3.
    /// Default: 1.3
    pub sparsity: f64,

    /// Registry handing out reusable block and copy buffers.
    pub buffer_pools: Arc<BufferPoolRegistry>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            compression: CompressionType::default(),
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            fsync: false,
            hash_type: HashType::Auto,
            sparsity: MIN_SPARSITY,
            buffer_pools: Arc::new(BufferPoolRegistry::new()),
        }
    }
}

/// Block framing variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    /// Records are written back to back with no block framing.
    None = 0,

    /// Each block is snappy-compressed and prefixed by its compressed length.
    #[cfg(feature = "snappy")]
    Snappy = 1,
}

impl CompressionType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            #[cfg(feature = "snappy")]
            1 => Some(CompressionType::Snappy),
            _ => None,
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "snappy")]
        return CompressionType::Snappy;

        #[cfg(not(feature = "snappy"))]
        CompressionType::None
    }
}

/// Width of the hashes stored in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    /// Pick 32 or 64 bits from the number of records being indexed.
    Auto,
    /// 32-bit hashes: smaller slots, more collisions on huge files.
    Hash32,
    /// 64-bit hashes.
    Hash64,
}

impl HashType {
    /// Resolve `Auto` into a concrete width for `num_records` records.
    pub fn resolve(self, num_records: u64) -> HashType {
        match self {
            HashType::Auto if num_records < AUTO_HASH64_THRESHOLD => HashType::Hash32,
            HashType::Auto => HashType::Hash64,
            other => other,
        }
    }

    /// Number of bytes a hash of this width occupies in a slot.
    ///
    /// An unresolved `Auto` counts as 64-bit, the same width `key_hash` and
    /// the slot layout give it.
    pub fn width_bytes(self) -> usize {
        match self {
            HashType::Hash32 => 4,
            HashType::Hash64 | HashType::Auto => 8,
        }
    }

    /// Inverse of `width_bytes`, used when decoding a footer.
    pub fn from_width_bytes(width: u8) -> Option<Self> {
        match width {
            4 => Some(HashType::Hash32),
            8 => Some(HashType::Hash64),
            _ => None,
        }
    }
}

/// Clamp a requested sparsity to the supported floor.
pub fn effective_sparsity(requested: f64) -> f64 {
    if requested.is_nan() || requested < MIN_SPARSITY {
        MIN_SPARSITY
    } else {
        requested
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block framing.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the uncompressed block size.
    pub fn max_block_size(mut self, size: usize) -> Self {
        self.max_block_size = size;
        self
    }

    /// Sets whether flushes and index builds are synced to disk.
    pub fn fsync(mut self, value: bool) -> Self {
        self.fsync = value;
        self
    }

    /// Sets the hash width for index builds.
    pub fn hash_type(mut self, hash_type: HashType) -> Self {
        self.hash_type = hash_type;
        self
    }

    /// Sets the index sparsity.
    pub fn sparsity(mut self, sparsity: f64) -> Self {
        self.sparsity = sparsity;
        self
    }

    /// Shares an existing buffer pool registry.
    pub fn buffer_pools(mut self, pools: Arc<BufferPoolRegistry>) -> Self {
        self.buffer_pools = pools;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_block_size == 0 {
            return Err(crate::Error::invalid_argument("max_block_size must be > 0"));
        }
        if self.max_block_size > u32::MAX as usize {
            return Err(crate::Error::invalid_argument("max_block_size must fit in 32 bits"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert_eq!(opts.max_block_size, DEFAULT_MAX_BLOCK_SIZE);
        assert!(!opts.fsync);
        assert_eq!(opts.hash_type, HashType::Auto);
        assert_eq!(opts.sparsity, MIN_SPARSITY);
    }

    #[test]
    fn test_options_builder() {
        let opts = Options::new()
            .max_block_size(64)
            .fsync(true)
            .hash_type(HashType::Hash64)
            .compression(CompressionType::None);

        assert_eq!(opts.max_block_size, 64);
        assert!(opts.fsync);
        assert_eq!(opts.hash_type, HashType::Hash64);
        assert_eq!(opts.compression, CompressionType::None);
    }

    #[test]
    fn test_options_validation() {
        let mut opts = Options::default();
        assert!(opts.validate().is_ok());

        opts.max_block_size = 0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_sparsity_floor() {
        assert_eq!(effective_sparsity(1.0), MIN_SPARSITY);
        assert_eq!(effective_sparsity(f64::NAN), MIN_SPARSITY);
        assert_eq!(effective_sparsity(2.5), 2.5);
    }

    #[test]
    fn test_hash_type_resolve() {
        assert_eq!(HashType::Auto.resolve(10), HashType::Hash32);
        assert_eq!(HashType::Auto.resolve(1 << 24), HashType::Hash64);
        assert_eq!(HashType::Hash64.resolve(1), HashType::Hash64);
        assert_eq!(HashType::from_width_bytes(4), Some(HashType::Hash32));
        assert_eq!(HashType::from_width_bytes(3), None);
    }

    #[test]
    fn test_unresolved_width() {
        assert_eq!(HashType::Hash32.width_bytes(), 4);
        assert_eq!(HashType::Auto.width_bytes(), HashType::Hash64.width_bytes());
    }
}
