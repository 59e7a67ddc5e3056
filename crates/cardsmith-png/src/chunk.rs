//! Raw PNG chunk walking and writing.
//!
//! A PNG stream is the 8-byte signature followed by chunks of the form
//! `length (u32 BE) | type (4 bytes) | data | crc32 (u32 BE)`, ending with
//! `IEND`. The CRC covers the type and data fields.

use cardsmith_common::BinaryReader;
use flate2::Crc;

use crate::{Error, Result};

/// PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Chunk type constants.
pub mod kind {
    pub const IHDR: [u8; 4] = *b"IHDR";
    pub const IDAT: [u8; 4] = *b"IDAT";
    pub const IEND: [u8; 4] = *b"IEND";
    pub const TEXT: [u8; 4] = *b"tEXt";
    pub const ZTXT: [u8; 4] = *b"zTXt";
    pub const ITXT: [u8; 4] = *b"iTXt";
}

/// A chunk borrowed from the source buffer.
#[derive(Debug, Clone, Copy)]
pub struct ChunkRef<'a> {
    /// Four-byte chunk type.
    pub kind: [u8; 4],
    /// Chunk payload.
    pub data: &'a [u8],
    /// Offset of the length field within the source buffer.
    pub offset: usize,
    /// CRC stored in the file.
    pub crc: u32,
}

impl<'a> ChunkRef<'a> {
    /// Chunk type as a string (`"????"` for non-ASCII types).
    pub fn kind_str(&self) -> &str {
        std::str::from_utf8(&self.kind).unwrap_or("????")
    }

    /// Whether the stored CRC matches the payload.
    pub fn crc_ok(&self) -> bool {
        crc32(&self.kind, self.data) == self.crc
    }

    /// Whether this is one of the three text chunk types.
    pub fn is_text(&self) -> bool {
        matches!(self.kind, kind::TEXT | kind::ZTXT | kind::ITXT)
    }

    /// Total encoded size including length, type and CRC fields.
    pub fn encoded_len(&self) -> usize {
        12 + self.data.len()
    }
}

/// Compute the PNG CRC-32 over a chunk type and payload.
pub fn crc32(kind: &[u8; 4], data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);
    crc.sum()
}

/// Walk every chunk of a PNG stream up to and including `IEND`.
///
/// Chunks with a bad CRC are kept (many card editors write sloppy text
/// chunks); the mismatch is logged.
pub fn chunks(data: &[u8]) -> Result<Vec<ChunkRef<'_>>> {
    if !data.starts_with(&PNG_SIGNATURE) {
        return Err(Error::InvalidSignature);
    }

    let mut reader = BinaryReader::new_at(data, PNG_SIGNATURE.len());
    let mut out = Vec::new();

    loop {
        let offset = reader.position();
        if reader.remaining() < 12 {
            return Err(Error::MissingEnd);
        }

        let length = reader.read_u32_be()? as usize;
        let mut chunk_kind = [0u8; 4];
        chunk_kind.copy_from_slice(reader.read_bytes(4)?);

        if reader.remaining() < length.saturating_add(4) {
            return Err(Error::TruncatedChunk {
                kind: String::from_utf8_lossy(&chunk_kind).into_owned(),
                offset,
            });
        }

        let payload = reader.read_bytes(length)?;
        let crc = reader.read_u32_be()?;
        let chunk = ChunkRef {
            kind: chunk_kind,
            data: payload,
            offset,
            crc,
        };

        if !chunk.crc_ok() {
            tracing::warn!(kind = chunk.kind_str(), offset, "PNG chunk CRC mismatch");
        }

        out.push(chunk);

        if chunk_kind == kind::IEND {
            return Ok(out);
        }
    }
}

/// Append one encoded chunk to `out`.
pub fn write_chunk(out: &mut Vec<u8>, chunk_kind: &[u8; 4], data: &[u8]) {
    out.reserve(12 + data.len());
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(chunk_kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc32(chunk_kind, data).to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_png() -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        let ihdr = [0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0];
        write_chunk(&mut out, &kind::IHDR, &ihdr);
        write_chunk(&mut out, &kind::IDAT, &[0x78, 0x9C, 0x63, 0x60, 0, 0, 0, 2, 0, 1]);
        write_chunk(&mut out, &kind::IEND, &[]);
        out
    }

    #[test]
    fn test_walk_chunks() {
        let png = minimal_png();
        let chunks = chunks(&png).unwrap();

        let kinds: Vec<_> = chunks.iter().map(|c| c.kind_str().to_string()).collect();
        assert_eq!(kinds, ["IHDR", "IDAT", "IEND"]);
        assert!(chunks.iter().all(|c| c.crc_ok()));
    }

    #[test]
    fn test_known_iend_crc() {
        assert_eq!(crc32(&kind::IEND, &[]), 0xAE42_6082);
    }

    #[test]
    fn test_invalid_signature() {
        assert!(matches!(chunks(b"GIF89a"), Err(Error::InvalidSignature)));
    }

    #[test]
    fn test_truncated_chunk() {
        let mut png = minimal_png();
        png.truncate(PNG_SIGNATURE.len() + 14);
        assert!(matches!(
            chunks(&png),
            Err(Error::TruncatedChunk { .. })
        ));
    }

    #[test]
    fn test_missing_end() {
        let png = minimal_png();
        let without_iend = &png[..png.len() - 12];
        assert!(matches!(chunks(without_iend), Err(Error::MissingEnd)));
    }
}
