//! Error types for the card pipeline.

use thiserror::Error;

use crate::validate::ValidationReport;

/// Errors that can occur while detecting, importing or exporting cards.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error
    #[error("{0}")]
    Common(#[from] cardsmith_common::Error),

    /// PNG container error
    #[error("PNG error: {0}")]
    Png(#[from] cardsmith_png::Error),

    /// ZIP container error
    #[error("archive error: {0}")]
    Zip(#[from] cardsmith_zip::Error),

    /// Card record error
    #[error("card error: {0}")]
    Card(#[from] cardsmith_card::Error),

    /// JSON document error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image decoding or encoding error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// No handler claims the input.
    #[error("unsupported format")]
    UnsupportedFormat,

    /// The handler for a format cannot perform the requested direction.
    #[error("{format} does not support {operation}")]
    UnsupportedOperation {
        format: crate::CardFormat,
        operation: &'static str,
    },

    /// A decoded container is structurally wrong.
    #[error("invalid container: {0}")]
    InvalidContainer(String),

    /// The external schema rejected a record.
    #[error("schema validation failed: {}", .0.join("; "))]
    Schema(Vec<String>),

    /// Export validation found blocking errors.
    #[error("export validation failed: {}", .0.errors.join("; "))]
    ExportValidation(Box<ValidationReport>),

    /// Storage backend failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A referenced card or asset does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// External media optimizer failed.
    #[error("media optimizer failed: {0}")]
    Optimizer(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No handler claims the bytes.
    DetectionFailure,
    /// The codec cannot decode the container.
    ParseFailure,
    /// The record fails external schema checks.
    SchemaValidationFailure,
    /// Export blocked by validation rules.
    ExportValidationError,
    /// The codec cannot encode the bundle.
    EncodeFailure,
    /// Disk, permission and similar failures.
    Io,
    /// Repository or storage backend failure.
    Storage,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Common(cardsmith_common::Error::Io(_)) => ErrorKind::Io,
            Self::Png(cardsmith_png::Error::Io(_)) => ErrorKind::Io,
            Self::Zip(cardsmith_zip::Error::Io(_)) => ErrorKind::Io,
            Self::Storage(_) | Self::NotFound(_) => ErrorKind::Storage,
            Self::UnsupportedFormat | Self::UnsupportedOperation { .. } => {
                ErrorKind::DetectionFailure
            }
            Self::Schema(_) => ErrorKind::SchemaValidationFailure,
            Self::ExportValidation(_) => ErrorKind::ExportValidationError,
            Self::Optimizer(_) | Self::Config(_) => ErrorKind::EncodeFailure,
            Self::Common(_)
            | Self::Png(_)
            | Self::Zip(_)
            | Self::Card(_)
            | Self::Json(_)
            | Self::Image(_)
            | Self::InvalidContainer(_) => ErrorKind::ParseFailure,
        }
    }

    /// Whether the error must propagate instead of becoming a failed result.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Io | ErrorKind::Storage)
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
