//! Centralized error types for mailscrub.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailscrub library.
#[derive(Error, Debug)]
pub enum ScrubError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The input record stream does not exist.
    #[error("Record stream not found: {0}")]
    InputNotFound(PathBuf),

    /// A record could not be decoded at a specific byte offset.
    #[error("Malformed record at offset {offset}: {reason}")]
    MalformedRecord { offset: u64, reason: String },

    /// A record payload exceeds the configured line length limit.
    #[error("Record at offset {offset} is {length} bytes, limit is {limit}")]
    RecordTooLong {
        offset: u64,
        length: u32,
        limit: u32,
    },

    /// An unrecognized record tag byte.
    #[error("Unknown record tag 0x{tag:02x} at offset {offset}")]
    UnknownRecordTag { offset: u64, tag: u8 },

    /// A lookup table failed at the I/O level (distinct from "not found").
    #[error("Lookup table '{table}' failed: {reason}")]
    Table { table: String, reason: String },

    /// A content-inspection rule file could not be parsed.
    #[error("Bad inspection rule on line {line}: {reason}")]
    BadRule { line: usize, reason: String },

    /// The configuration file is invalid.
    #[error("Invalid configuration: {0}")]
    BadConfig(String),
}

/// Convenience alias for `Result<T, ScrubError>`.
pub type Result<T> = std::result::Result<T, ScrubError>;

impl ScrubError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `ScrubError`
/// when no path context is available (rare — prefer `ScrubError::io`).
impl From<std::io::Error> for ScrubError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
