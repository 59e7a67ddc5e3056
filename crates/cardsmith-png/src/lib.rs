//! PNG chunk codec for character cards.
//!
//! Character cards travel inside ordinary PNG portraits: the card record is
//! stored as base64 JSON in a `tEXt` chunk with the keyword `chara` (or
//! `ccv3` for V3-aware writers), and some writers add numbered side-channel
//! chunks carrying extra assets. This crate deals with the chunk layer only:
//!
//! - [`chunk`] - Walk and write raw chunks, with CRC-32 verification
//! - [`text`] - Decode `tEXt`, `zTXt` and `iTXt`, encode `tEXt`
//! - [`CardPng`] - Locate the card chunk and collect every other text chunk
//!
//! Card semantics (base64, JSON) are left to the caller.
//!
//! # Example
//!
//! ```no_run
//! use cardsmith_png::{CardPng, SizeGate};
//!
//! let data = std::fs::read("card.png")?;
//! let card = CardPng::parse(&data, &SizeGate::default())?;
//! if let Some(text) = card.card_text() {
//!     println!("card chunk: {} bytes", text.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod card;
mod error;

pub mod chunk;
pub mod text;

pub use card::{
    embed_text_chunks, has_card_chunk, strip_text_chunks, CardPng, SizeGate, CARD_KEYWORDS,
};
pub use chunk::{ChunkRef, PNG_SIGNATURE};
pub use error::{Error, Result};
pub use text::TextChunk;

/// Check if data starts with the PNG signature.
pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&PNG_SIGNATURE)
}
