//! Base-128 variable-length integer codec.
//!
//! Each byte carries 7 value bits, least significant group first. The high bit
//! is set on every byte except the last, so a `u64` takes 1 to 10 bytes.

use bytes::BufMut;
use std::io::{self, Read, Write};

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Number of bytes `value` occupies once encoded.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

/// Encode `value` into a stack buffer, returning the buffer and the used length.
fn encode(mut value: u64) -> ([u8; MAX_VARINT_LEN], usize) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let mut len = 0;
    while value >= 0x80 {
        buf[len] = (value as u8 & 0x7F) | 0x80;
        value >>= 7;
        len += 1;
    }
    buf[len] = value as u8;
    (buf, len + 1)
}

/// Write `value` to a byte sink.
pub fn write<W: Write + ?Sized>(value: u64, sink: &mut W) -> io::Result<()> {
    let (buf, len) = encode(value);
    sink.write_all(&buf[..len])
}

/// Append `value` to an in-memory buffer.
pub fn put<B: BufMut>(value: u64, buf: &mut B) {
    let (bytes, len) = encode(value);
    buf.put_slice(&bytes[..len]);
}

/// Read one value from a byte source.
///
/// Fails with `InvalidData` when the encoding runs past 10 bytes and with
/// `UnexpectedEof` when the source ends mid-value.
pub fn read<R: Read + ?Sized>(source: &mut R) -> io::Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;
    let mut byte = [0u8; 1];

    loop {
        source.read_exact(&mut byte)?;
        let b = byte[0];
        result |= ((b & 0x7F) as u64) << shift;
        if b & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "varint too long"));
        }
    }
}

/// Decode one value from the front of `data`.
///
/// Returns the value and the number of bytes consumed, or `None` if `data`
/// ends before the value does or the encoding is overlong.
pub fn decode(data: &[u8]) -> Option<(u64, usize)> {
    let mut result = 0u64;
    for (i, &b) in data.iter().take(MAX_VARINT_LEN).enumerate() {
        result |= ((b & 0x7F) as u64) << (7 * i);
        if b & 0x80 == 0 {
            return Some((result, i + 1));
        }
    }
    None
}

/// Move exactly `len` bytes from `source` to `sink` through `scratch`.
///
/// No allocation happens here; the caller owns the scratch space. A source that
/// runs dry before `len` bytes fails with `UnexpectedEof`.
pub fn copy<R, W>(len: u64, source: &mut R, sink: &mut W, scratch: &mut [u8]) -> io::Result<()>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    assert!(!scratch.is_empty(), "copy needs a non-empty scratch buffer");

    let mut left = len;
    while left > 0 {
        let want = left.min(scratch.len() as u64) as usize;
        let n = source.read(&mut scratch[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended with {} of {} bytes left", left, len),
            ));
        }
        sink.write_all(&scratch[..n])?;
        left -= n as u64;
    }
    Ok(())
}
