//! Cardsmith - character card conversion pipeline.
//!
//! Detects, imports and exports character cards stored as plain JSON, PNG
//! images with embedded text chunks, CHARX archives and Voxta packages.
//! Every format decodes into the canonical [`card::CardRecord`]; assets are
//! resolved to bytes, tagged, and persisted through the [`CardRepository`]
//! and [`AssetStorage`] traits.
//!
//! # Crates
//!
//! - [`common`] - Binary reading, byte search, hashing, MIME sniffing
//! - [`png`] - PNG chunk codec and card chunk extraction
//! - [`zip`] - Bounded ZIP reading and deterministic writing
//! - [`card`] - Canonical record model and package mappings
//!
//! # Example
//!
//! ```
//! use cardsmith::prelude::*;
//!
//! let registry = HandlerRegistry::with_defaults();
//! let repository = MemoryRepository::new();
//! let storage = MemoryStorage::new();
//! let config = PipelineConfig::default();
//!
//! let imported = registry.import(&ImportContext {
//!     data: br#"{"name": "Ava", "first_mes": "Hi!"}"#,
//!     filename: Some("ava.json"),
//!     mimetype: None,
//!     repository: &repository,
//!     storage: &storage,
//!     schema: &PermissiveSchema,
//!     config: &config,
//! })?;
//! assert!(imported.success);
//!
//! let exported = registry.export(CardFormat::Png, &ExportContext {
//!     card_id: &imported.card_ids[0],
//!     repository: &repository,
//!     storage: &storage,
//!     optimizer: &Passthrough,
//!     config: &config,
//! })?;
//! assert_eq!(exported.filename, "Ava.png");
//! # Ok::<(), cardsmith::Error>(())
//! ```

mod error;

pub mod config;
pub mod export;
pub mod format;
pub mod handler;
pub mod handlers;
pub mod import;
pub mod main_icon;
pub mod media;
pub mod paths;
pub mod registry;
pub mod repository;
pub mod resolve;
pub mod schema;
pub mod tags;
pub mod validate;

// Re-export sub-crates
pub use cardsmith_card as card;
pub use cardsmith_common as common;
pub use cardsmith_png as png;
pub use cardsmith_zip as zip;

pub use config::{Limits, PipelineConfig};
pub use error::{Error, ErrorKind, Result};
pub use format::{CardFormat, Confidence, DetectionResult, Hints};
pub use handler::{ExportContext, ExportResult, FormatHandler, ImportContext, ImportResult};
pub use registry::HandlerRegistry;
pub use repository::{AssetStorage, CardRepository, MemoryRepository, MemoryStorage};
pub use validate::ValidationReport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::format::{CardFormat, Confidence, Hints};
    pub use crate::handler::{ExportContext, FormatHandler, ImportContext};
    pub use crate::media::{CommandOptimizer, MediaOptimizer, Passthrough};
    pub use crate::registry::HandlerRegistry;
    pub use crate::repository::{AssetStorage, CardRepository, MemoryRepository, MemoryStorage};
    pub use crate::schema::{PermissiveSchema, RequireName, SchemaValidator};
    pub use cardsmith_card::{CardData, CardRecord};
    pub use cardsmith_common::TempArtifact;
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
