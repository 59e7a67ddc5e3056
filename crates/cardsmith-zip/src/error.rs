//! Error types for the ZIP crate.

use thiserror::Error;

/// Errors that can occur when working with card archives.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] cardsmith_common::Error),

    /// Error reported by the zip codec.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Invalid record signature.
    #[error("invalid ZIP signature at offset {offset}: expected {expected:02x?}")]
    InvalidSignature { offset: usize, expected: [u8; 4] },

    /// Could not find the end of central directory record.
    #[error("could not find end of central directory record")]
    EocdNotFound,

    /// ZIP64 record not found when expected.
    #[error("ZIP64 end of central directory not found")]
    Zip64EocdNotFound,

    /// Archive spans several disks.
    #[error("multi-disk archives are not supported")]
    MultiDisk,

    /// Too many members.
    #[error("archive has {count} entries, above the limit of {limit}")]
    TooManyEntries { count: u64, limit: u64 },

    /// Declared uncompressed total too large.
    #[error("archive expands to {total} bytes, above the limit of {limit}")]
    TooLarge { total: u64, limit: u64 },

    /// A single member declares too large an uncompressed size.
    #[error("entry {name} expands to {size} bytes, above the limit of {limit}")]
    EntryTooLarge { name: String, size: u64, limit: u64 },

    /// A member produced more data than its header declared.
    #[error("entry {name} declared {declared} bytes but inflates further")]
    SizeMismatch { name: String, declared: u64 },

    /// Entry not found.
    #[error("entry not found: {0}")]
    EntryNotFound(String),
}

/// Result type for ZIP operations.
pub type Result<T> = std::result::Result<T, Error>;
