//! Data file footer.
//!
//! The footer is a fixed-size (64 bytes) structure at the end of an indexed
//! data file. It says where the records end, where the index table is and how
//! to interpret both.

use crate::config::{CompressionType, HashType};
use crate::error::{Error, Result};
use std::io::{Read, Write};

/// Magic number identifying a HOS data file footer.
pub const MAGIC_NUMBER: u64 = 0x484f_5344_4154_4131; // "HOSDATA1"

/// Current footer format version.
pub const FORMAT_VERSION: u8 = 1;

/// Encoded footer size in bytes.
pub const FOOTER_LEN: usize = 64;

/// Footer of an indexed data file.
///
/// Format (little-endian):
/// ```text
/// [magic: 8][version: 1][compression: 1][hash width: 1][reserved: 1]
/// [max_block_size: 4][data_end: 8][index_offset: 8][slot_count: 8]
/// [num_records: 8][num_live: 8][reserved: 4][crc32: 4]
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footer {
    /// Block framing of the data region
    pub compression: CompressionType,
    /// Width of the hashes in the index table
    pub hash_type: HashType,
    /// Uncompressed block capacity the data was written with
    pub max_block_size: u32,
    /// End of the data region
    pub data_end: u64,
    /// Start of the index table
    pub index_offset: u64,
    /// Number of slots in the index table
    pub slot_count: u64,
    /// Records (puts and deletes) in the data region
    pub num_records: u64,
    /// Keys whose most recent record is a put
    pub num_live: u64,
}

impl Footer {
    /// Encode the footer to bytes (64 bytes).
    pub fn encode(&self) -> [u8; FOOTER_LEN] {
        let mut buf = [0u8; FOOTER_LEN];
        buf[0..8].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
        buf[8] = FORMAT_VERSION;
        buf[9] = self.compression as u8;
        buf[10] = self.hash_type.width_bytes() as u8;
        buf[12..16].copy_from_slice(&self.max_block_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.data_end.to_le_bytes());
        buf[24..32].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[32..40].copy_from_slice(&self.slot_count.to_le_bytes());
        buf[40..48].copy_from_slice(&self.num_records.to_le_bytes());
        buf[48..56].copy_from_slice(&self.num_live.to_le_bytes());
        let crc = crc32fast::hash(&buf[..60]);
        buf[60..64].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Whether `data` starts with the footer magic number.
    pub fn has_magic(data: &[u8]) -> bool {
        data.len() >= 8 && read_u64(data, 0) == MAGIC_NUMBER
    }

    /// Decode a footer from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_LEN {
            return Err(Error::corruption(format!(
                "Footer size mismatch: expected {}, got {}",
                FOOTER_LEN,
                data.len()
            )));
        }

        if !Self::has_magic(data) {
            return Err(Error::corruption(format!(
                "Invalid data file magic number: expected {:#x}, got {:#x}",
                MAGIC_NUMBER,
                read_u64(data, 0)
            )));
        }

        let stored_crc = u32::from_le_bytes([data[60], data[61], data[62], data[63]]);
        let actual_crc = crc32fast::hash(&data[..60]);
        if stored_crc != actual_crc {
            return Err(Error::corruption(format!(
                "Footer checksum mismatch: expected {:#x}, got {:#x}",
                stored_crc, actual_crc
            )));
        }

        if data[8] != FORMAT_VERSION {
            return Err(Error::corruption(format!("Unsupported footer version {}", data[8])));
        }
        let compression = CompressionType::from_u8(data[9])
            .ok_or_else(|| Error::corruption(format!("Unsupported compression type {}", data[9])))?;
        let hash_type = HashType::from_width_bytes(data[10])
            .ok_or_else(|| Error::corruption(format!("Invalid hash width {}", data[10])))?;

        Ok(Self {
            compression,
            hash_type,
            max_block_size: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            data_end: read_u64(data, 16),
            index_offset: read_u64(data, 24),
            slot_count: read_u64(data, 32),
            num_records: read_u64(data, 40),
            num_live: read_u64(data, 48),
        })
    }

    /// Write the footer to a writer
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.encode())?;
        Ok(())
    }

    /// Read the footer from a reader
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; FOOTER_LEN];
        reader.read_exact(&mut buf)?;
        Self::decode(&buf)
    }
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Footer {
        Footer {
            compression: CompressionType::None,
            hash_type: HashType::Hash64,
            max_block_size: 4096,
            data_end: 1000,
            index_offset: 1000,
            slot_count: 13,
            num_records: 10,
            num_live: 7,
        }
    }

    #[test]
    fn test_footer_encode_decode() {
        let footer = sample();
        let encoded = footer.encode();
        assert_eq!(encoded.len(), FOOTER_LEN);
        assert_eq!(encoded[10], 8);

        let decoded = Footer::decode(&encoded).unwrap();
        assert_eq!(decoded, footer);
    }

    #[test]
    fn test_footer_magic_number() {
        let encoded = sample().encode();
        assert!(Footer::has_magic(&encoded));
        assert_eq!(u64::from_le_bytes(encoded[0..8].try_into().unwrap()), MAGIC_NUMBER);
    }

    #[test]
    fn test_footer_invalid_magic() {
        let mut data = sample().encode();
        data[0..8].copy_from_slice(&0x1234567890abcdefu64.to_le_bytes());

        let result = Footer::decode(&data);
        assert!(matches!(result.unwrap_err(), Error::Corruption(_)));
    }

    #[test]
    fn test_footer_checksum() {
        let mut data = sample().encode();
        data[20] ^= 0x01;

        let err = Footer::decode(&data).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_footer_bad_hash_width() {
        let mut data = sample().encode();
        data[10] = 3;
        let crc = crc32fast::hash(&data[..60]);
        data[60..64].copy_from_slice(&crc.to_le_bytes());

        assert!(matches!(Footer::decode(&data), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_footer_write_read() {
        let footer = sample();

        let mut buffer = Vec::new();
        footer.write_to(&mut buffer).unwrap();

        let mut cursor = Cursor::new(buffer);
        let read_footer = Footer::read_from(&mut cursor).unwrap();

        assert_eq!(read_footer, footer);
    }

    #[test]
    fn test_footer_unresolved_hash_type() {
        let footer = Footer { hash_type: HashType::Auto, ..sample() };
        let decoded = Footer::decode(&footer.encode()).unwrap();
        assert_eq!(decoded.hash_type, HashType::Hash64);
    }

    #[test]
    fn test_footer_wrong_size() {
        assert!(matches!(Footer::decode(&[0u8; 48]), Err(Error::Corruption(_))));
    }
}
