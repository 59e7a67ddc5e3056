//! Canonical character card model.
//!
//! Every container format is decoded into the same in-memory record:
//!
//! - [`CardRecord`] - V2 or V3 card, unknown fields preserved
//! - [`AssetDescriptor`] - One asset reference before byte resolution
//! - [`json`] - Parsing with a recovery scan for damaged files
//! - [`voxta`] - Package documents and their mapping to the canonical record
//!
//! # Example
//!
//! ```
//! use cardsmith_card::{json, SpecVersion};
//!
//! let record = json::parse_card(r#"{"name": "Ava", "first_mes": "Hi!"}"#)?;
//! assert_eq!(record.version(), SpecVersion::V2);
//! assert_eq!(record.name(), "Ava");
//! # Ok::<(), cardsmith_card::Error>(())
//! ```

mod de;
mod error;
mod record;

pub mod asset;
pub mod json;
pub mod voxta;

pub use asset::{AssetDescriptor, AssetUri};
pub use error::{Error, Result};
pub use record::{BookEntry, CardData, CardRecord, CharacterBook, SpecVersion, SPEC_V2, SPEC_V3};
