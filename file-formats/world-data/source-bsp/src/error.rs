//! Error types for the VBSP library

use std::io;
use thiserror::Error;

use crate::header::LumpId;

/// Result type alias for VBSP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for VBSP operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// File identifier did not match
    #[error("Invalid magic: expected {expected:?}, found {found:?}")]
    InvalidMagic {
        /// Expected identifier bytes in file order
        expected: [u8; 4],
        /// Identifier bytes found in the file
        found: [u8; 4],
    },

    /// Structurally invalid data
    #[error("Invalid VBSP format: {0}")]
    InvalidFormat(String),

    /// Lump index outside the header table
    #[error("Lump index {index} out of range (table holds {max} lumps)")]
    LumpOutOfRange {
        /// Requested lump index
        index: usize,
        /// Number of lumps in the table
        max: usize,
    },

    /// Lump descriptor points outside its file
    #[error("Lump {lump} spans {offset}..{offset}+{size} but the file is {file_len} bytes")]
    LumpOutOfBounds {
        /// Lump being read
        lump: LumpId,
        /// Declared byte offset
        offset: i64,
        /// Declared byte size
        size: i64,
        /// Length of the backing file
        file_len: usize,
    },

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Whole-lump compression found on a lump that is compressed per segment
    #[error("Lump {0} is compressed per segment and cannot be decoded as a whole")]
    SegmentedLump(LumpId),

    /// Cross reference between arrays points past the end of its target
    #[error("Invalid {kind} reference {index} (count {max})")]
    InvalidReference {
        /// Kind of element being referenced
        kind: &'static str,
        /// Referenced index
        index: i64,
        /// Number of elements available
        max: usize,
    },

    /// A configured resource limit was exceeded
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// Lump overlay file does not describe a usable replacement
    #[error("Invalid lump patch: {0}")]
    InvalidPatch(String),
}

impl Error {
    /// Create a new InvalidFormat error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Error::InvalidFormat(msg.into())
    }

    /// Create a new Compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Error::Compression(msg.into())
    }

    /// Create a new InvalidPatch error
    pub fn invalid_patch<S: Into<String>>(msg: S) -> Self {
        Error::InvalidPatch(msg.into())
    }

    /// Check if this error indicates corrupted map data
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::InvalidMagic { .. }
                | Error::InvalidFormat(_)
                | Error::LumpOutOfBounds { .. }
                | Error::Compression(_)
                | Error::SegmentedLump(_)
                | Error::InvalidReference { .. }
        )
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the previously loaded map usable and may
    /// succeed when retried, for example once a missing file appears.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::InvalidPatch(_) | Error::LimitExceeded(_)
        )
    }
}
