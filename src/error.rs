//! Error types for the triple index and its building blocks.

use std::io;

use thiserror::Error;

/// Error variants for bitmap, sequence and triple index operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An index, key or id was outside the structure's bounds.
    #[error("index out of range: {index} (len {len})")]
    OutOfRange {
        /// The offending index.
        index: usize,
        /// The valid exclusive upper bound.
        len: usize,
    },

    /// A value does not fit in the fixed bit width of a sequence.
    #[error("value {value} does not fit in {width} bits")]
    ValueTooLarge {
        /// The rejected value.
        value: u64,
        /// The sequence width in bits.
        width: u8,
    },

    /// Input to a bulk build violated a precondition.
    #[error("construction failed: {0}")]
    Construction(String),

    /// A caller passed an argument no operation accepts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Persisted or vbyte-encoded data is malformed.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// The input ended before a complete value or section was read.
    #[error("unexpected end of stream")]
    EndOfStream,

    /// A persisted section failed integrity verification.
    #[error("checksum mismatch in {0} section")]
    ChecksumMismatch(&'static str),

    /// Attempted to mutate memory-mapped storage.
    #[error("storage is read-only")]
    ReadOnly,

    /// An I/O error occurred during serialization or deserialization.
    #[error("io error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::EndOfStream
        } else {
            Error::Io(err)
        }
    }
}

impl Error {
    pub(crate) fn out_of_range(index: usize, len: usize) -> Self {
        Error::OutOfRange { index, len }
    }
}

/// A specialized Result type for triple index operations.
pub type Result<T> = std::result::Result<T, Error>;
