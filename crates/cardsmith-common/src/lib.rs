//! Common utilities for cardsmith.
//!
//! This crate provides foundational types and utilities used across all cardsmith crates:
//!
//! - [`BinaryReader`] - Zero-copy binary reading from byte slices (little and big endian)
//! - [`scan`] - memchr-accelerated byte pattern searching
//! - [`hash`] - Content hashing for export determinism
//! - [`mime`] - MIME type sniffing from magic bytes and extensions
//! - [`TempArtifact`] - Scoped temporary files removed on every exit path

mod error;
mod reader;
mod temp;

pub mod hash;
pub mod mime;
pub mod scan;

pub use error::{Error, Result};
pub use reader::BinaryReader;
pub use temp::TempArtifact;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Re-export memchr for SIMD-accelerated byte searching
pub use memchr;
