//! Error types for PNG chunk handling.

use thiserror::Error;

/// Errors that can occur when reading or writing PNG chunks.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] cardsmith_common::Error),

    /// Missing or wrong PNG signature.
    #[error("not a PNG file: invalid signature")]
    InvalidSignature,

    /// A chunk header points past the end of the buffer.
    #[error("chunk {kind} at offset {offset} is truncated")]
    TruncatedChunk { kind: String, offset: usize },

    /// The stream ended without an IEND chunk.
    #[error("PNG has no IEND chunk")]
    MissingEnd,

    /// The input exceeds the configured hard size limit.
    #[error("PNG is {size} bytes, above the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    /// Malformed text chunk.
    #[error("invalid {kind} chunk: {reason}")]
    InvalidText { kind: &'static str, reason: String },

    /// Decompression error in zTXt/iTXt.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Keyword not representable in a tEXt chunk.
    #[error("invalid text keyword {0:?}: must be 1-79 Latin-1 characters")]
    InvalidKeyword(String),
}

/// Result type for PNG operations.
pub type Result<T> = std::result::Result<T, Error>;
