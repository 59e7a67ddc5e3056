//! Error types for the card model.

use thiserror::Error;

/// Errors that can occur when parsing or converting card records.
#[derive(Debug, Error)]
pub enum Error {
    /// JSON syntax or shape error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON that is not a character card.
    #[error("not a character card: {0}")]
    NotACard(String),

    /// Neither a direct parse nor the recovery scan produced a card.
    #[error("could not parse card JSON: {0}")]
    Unrecoverable(String),

    /// Base64 payload could not be decoded.
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Malformed `data:` URI.
    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),
}

/// Result type for card operations.
pub type Result<T> = std::result::Result<T, Error>;
