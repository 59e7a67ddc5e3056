//! ZIP handling for card archives.
//!
//! CHARX files and package archives are plain ZIP files. Both come from
//! untrusted sources, so every archive goes through a metadata-only
//! preflight before any member is inflated:
//!
//! - [`Preflight`] - Central directory walk (ZIP64 aware) with size ceilings
//! - [`CardArchive`] - Bounded member reads on top of the `zip` codec
//! - [`ArchiveWriter`] - Deterministic output (fixed timestamps, stable order)
//!
//! # Example
//!
//! ```no_run
//! use cardsmith_zip::{CardArchive, ZipLimits};
//!
//! let data = std::fs::read("card.charx")?;
//! let mut archive = CardArchive::open(&data, &ZipLimits::default())?;
//! let card_json = archive.read_string("card.json")?;
//! println!("{} bytes of card data", card_json.len());
//! # Ok::<(), cardsmith_zip::Error>(())
//! ```

mod archive;
mod error;
mod preflight;
mod writer;
pub mod structs;

pub use archive::CardArchive;
pub use error::{Error, Result};
pub use preflight::{is_safe_path, list_names, EntryMeta, Preflight, ZipLimits};
pub use writer::ArchiveWriter;

/// Check if data starts with a ZIP local file header.
pub fn is_zip(data: &[u8]) -> bool {
    data.starts_with(&structs::LocalFileHeader::MAGIC)
}
