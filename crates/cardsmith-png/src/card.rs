//! Card extraction from and embedding into PNG containers.

use crate::chunk::{self, kind, ChunkRef, PNG_SIGNATURE};
use crate::text::TextChunk;
use crate::{Error, Result};

/// Keywords that carry the card record, in preference order.
///
/// `ccv3` holds a V3 record; `chara` holds V2 (or V3 from writers that only
/// know the legacy keyword).
pub const CARD_KEYWORDS: [&str; 2] = ["ccv3", "chara"];

/// Input size limits applied before any chunk is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeGate {
    /// Inputs above this size are accepted but logged.
    pub warn_bytes: usize,
    /// Inputs above this size are rejected.
    pub max_bytes: usize,
    /// Maximum inflated size of a single compressed text chunk.
    pub text_max_bytes: usize,
}

impl Default for SizeGate {
    fn default() -> Self {
        Self {
            warn_bytes: 16 * 1024 * 1024,
            max_bytes: 64 * 1024 * 1024,
            text_max_bytes: 32 * 1024 * 1024,
        }
    }
}

impl SizeGate {
    /// Check an input length. Returns `true` if it is above the warning threshold.
    pub fn check(&self, size: usize) -> Result<bool> {
        if size > self.max_bytes {
            return Err(Error::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(size > self.warn_bytes)
    }
}

/// A PNG split into its card chunk, remaining text chunks and image.
#[derive(Debug, Clone)]
pub struct CardPng {
    card: Option<TextChunk>,
    extra: Vec<TextChunk>,
    oversized: bool,
    image: Vec<u8>,
}

impl CardPng {
    /// Parse a PNG, collecting its text chunks.
    ///
    /// The first chunk whose keyword is in [`CARD_KEYWORDS`] (preferring
    /// `ccv3` over `chara`) becomes the card; every other text chunk is kept
    /// in file order as the extra chunk table. Text chunks that fail to
    /// decode are skipped with a warning.
    pub fn parse(data: &[u8], gate: &SizeGate) -> Result<Self> {
        let oversized = gate.check(data.len())?;
        if oversized {
            tracing::warn!(
                size = data.len(),
                threshold = gate.warn_bytes,
                "PNG is above the size warning threshold"
            );
        }

        let chunks = chunk::chunks(data)?;
        let mut texts = Vec::new();

        for c in chunks.iter().filter(|c| c.is_text()) {
            match TextChunk::decode(c, gate.text_max_bytes) {
                Ok(Some(text)) => texts.push(text),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(kind = c.kind_str(), offset = c.offset, error = %e, "skipping undecodable text chunk");
                }
            }
        }

        let card_index = CARD_KEYWORDS
            .iter()
            .find_map(|keyword| texts.iter().position(|t| t.keyword == *keyword));
        let card = card_index.map(|i| texts.remove(i));

        let image = rebuild(&chunks, |c| !c.is_text(), &[]);

        Ok(Self {
            card,
            extra: texts,
            oversized,
            image,
        })
    }

    /// Whether the container carries a card chunk at all.
    pub fn has_card(&self) -> bool {
        self.card.is_some()
    }

    /// Keyword of the card chunk.
    pub fn card_keyword(&self) -> Option<&str> {
        self.card.as_ref().map(|c| c.keyword.as_str())
    }

    /// Raw (usually base64) text of the card chunk.
    pub fn card_text(&self) -> Option<&str> {
        self.card.as_ref().map(|c| c.text.as_str())
    }

    /// Every non-card text chunk, in file order.
    pub fn extra_chunks(&self) -> &[TextChunk] {
        &self.extra
    }

    /// Take ownership of the extra chunk table.
    pub fn take_extra_chunks(&mut self) -> Vec<TextChunk> {
        std::mem::take(&mut self.extra)
    }

    /// Whether the input tripped the size warning threshold.
    pub fn is_oversized(&self) -> bool {
        self.oversized
    }

    /// The PNG with every text chunk removed.
    pub fn stripped_image(&self) -> &[u8] {
        &self.image
    }

    /// Consume and return the stripped PNG.
    pub fn into_stripped_image(self) -> Vec<u8> {
        self.image
    }
}

/// Quick check for a card chunk without decoding any payload.
///
/// Used by format detection; only walks chunk headers and keywords.
pub fn has_card_chunk(data: &[u8]) -> bool {
    let Ok(chunks) = chunk::chunks(data) else {
        return false;
    };
    chunks.iter().filter(|c| c.is_text()).any(|c| {
        let keyword_end = cardsmith_common::scan::find_byte(0, c.data).unwrap_or(c.data.len());
        let keyword = &c.data[..keyword_end];
        CARD_KEYWORDS.iter().any(|k| k.as_bytes() == keyword)
    })
}

/// Return a copy of the PNG with every text chunk removed.
pub fn strip_text_chunks(data: &[u8]) -> Result<Vec<u8>> {
    let chunks = chunk::chunks(data)?;
    Ok(rebuild(&chunks, |c| !c.is_text(), &[]))
}

/// Return a copy of the PNG with existing text chunks removed and `texts`
/// written as `tEXt` chunks immediately before `IEND`.
pub fn embed_text_chunks(data: &[u8], texts: &[TextChunk]) -> Result<Vec<u8>> {
    let chunks = chunk::chunks(data)?;
    let encoded = texts
        .iter()
        .map(TextChunk::encode_text)
        .collect::<Result<Vec<_>>>()?;
    Ok(rebuild(&chunks, |c| !c.is_text(), &encoded))
}

fn rebuild<F>(chunks: &[ChunkRef<'_>], keep: F, texts_before_end: &[Vec<u8>]) -> Vec<u8>
where
    F: Fn(&ChunkRef<'_>) -> bool,
{
    let capacity = PNG_SIGNATURE.len()
        + chunks.iter().map(ChunkRef::encoded_len).sum::<usize>()
        + texts_before_end.iter().map(|t| t.len() + 12).sum::<usize>();
    let mut out = Vec::with_capacity(capacity);
    out.extend_from_slice(&PNG_SIGNATURE);

    for c in chunks {
        if c.kind == kind::IEND {
            for text in texts_before_end {
                chunk::write_chunk(&mut out, &kind::TEXT, text);
            }
        }
        if keep(c) {
            chunk::write_chunk(&mut out, &c.kind, c.data);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn test_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_embed_then_parse() {
        let png = embed_text_chunks(
            &test_png(),
            &[
                TextChunk::new("chara", "djI="),
                TextChunk::new("chara-ext-asset_0", "aGVsbG8="),
            ],
        )
        .unwrap();

        let card = CardPng::parse(&png, &SizeGate::default()).unwrap();
        assert_eq!(card.card_keyword(), Some("chara"));
        assert_eq!(card.card_text(), Some("djI="));
        assert_eq!(card.extra_chunks().len(), 1);
        assert_eq!(card.extra_chunks()[0].keyword, "chara-ext-asset_0");
        assert!(has_card_chunk(&png));

        // The stripped image is still a decodable PNG without text.
        let stripped = card.stripped_image();
        assert!(!has_card_chunk(stripped));
        assert!(image::load_from_memory(stripped).is_ok());
    }

    #[test]
    fn test_ccv3_preferred_over_chara() {
        let png = embed_text_chunks(
            &test_png(),
            &[TextChunk::new("chara", "v2"), TextChunk::new("ccv3", "v3")],
        )
        .unwrap();

        let card = CardPng::parse(&png, &SizeGate::default()).unwrap();
        assert_eq!(card.card_keyword(), Some("ccv3"));
        assert_eq!(card.extra_chunks()[0].keyword, "chara");
    }

    #[test]
    fn test_embed_replaces_existing_text() {
        let once = embed_text_chunks(&test_png(), &[TextChunk::new("chara", "old")]).unwrap();
        let twice = embed_text_chunks(&once, &[TextChunk::new("chara", "new")]).unwrap();

        let card = CardPng::parse(&twice, &SizeGate::default()).unwrap();
        assert_eq!(card.card_text(), Some("new"));
        assert!(card.extra_chunks().is_empty());
    }

    #[test]
    fn test_size_gate() {
        let gate = SizeGate {
            warn_bytes: 10,
            max_bytes: 20,
            text_max_bytes: 10,
        };
        assert!(!gate.check(5).unwrap());
        assert!(gate.check(15).unwrap());
        assert!(matches!(gate.check(25), Err(Error::TooLarge { .. })));

        let png = test_png();
        assert!(matches!(
            CardPng::parse(&png, &gate),
            Err(Error::TooLarge { .. })
        ));
    }

    #[test]
    fn test_plain_png_has_no_card() {
        let card = CardPng::parse(&test_png(), &SizeGate::default()).unwrap();
        assert!(!card.has_card());
        assert!(card.extra_chunks().is_empty());
    }
}
