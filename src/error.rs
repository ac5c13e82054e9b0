//! Error types for the HOS data file.

use std::io;
use thiserror::Error;

/// The result type used throughout HosDb.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for HosDb operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying sink or source failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A chunked store was declared with an illegal size.
    #[error("Invalid size: {0}")]
    InvalidSize(String),

    /// A cursor or seek went past the declared bounds.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Block framing or decompression was inconsistent.
    #[error("Corrupt block: {0}")]
    CorruptBlock(String),

    /// The writer has already been closed.
    #[error("Writer is closed")]
    ClosedWriter,

    /// A record could not be written or undone, so the data region ends in a
    /// partial record. The writer refuses further work.
    #[error("Writer failed part way through a record")]
    FailedWriter,

    /// Footer or index metadata is damaged.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A value could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Creates a new corrupt block error.
    pub fn corrupt_block(msg: impl Into<String>) -> Self {
        Error::CorruptBlock(msg.into())
    }

    /// Creates a new out of range error.
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Error::OutOfRange(msg.into())
    }

    /// Creates a new invalid size error.
    pub fn invalid_size(msg: impl Into<String>) -> Self {
        Error::InvalidSize(msg.into())
    }

    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Maps an I/O failure while reading framed data.
    ///
    /// Running out of bytes in the middle of a block means the framing lied
    /// about its length, which is corruption rather than a sink failure.
    pub(crate) fn from_block_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::CorruptBlock(format!("truncated block: {}", err))
        } else {
            Error::Io(err)
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corrupt_block("bad length");
        assert_eq!(err.to_string(), "Corrupt block: bad length");

        let err = Error::ClosedWriter;
        assert_eq!(err.to_string(), "Writer is closed");

        let err = Error::FailedWriter;
        assert_eq!(err.to_string(), "Writer failed part way through a record");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_truncation_is_corruption() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(Error::from_block_read(eof), Error::CorruptBlock(_)));

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(Error::from_block_read(denied), Error::Io(_)));
    }
}
