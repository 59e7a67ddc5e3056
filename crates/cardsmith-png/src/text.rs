//! PNG text chunks.
//!
//! Three flavours exist:
//!
//! - `tEXt`: `keyword \0 text`, Latin-1
//! - `zTXt`: `keyword \0 method text`, text zlib-compressed (method 0)
//! - `iTXt`: `keyword \0 flag method language \0 translated \0 text`, UTF-8,
//!   optionally zlib-compressed
//!
//! Card payloads are base64, so in practice everything is ASCII, but the
//! decoders follow the chunk definitions.

use std::io::Read;

use cardsmith_common::BinaryReader;
use flate2::read::ZlibDecoder;

use crate::chunk::{kind, ChunkRef};
use crate::{Error, Result};

/// A decoded text chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Chunk keyword.
    pub keyword: String,
    /// Decoded text.
    pub text: String,
}

impl TextChunk {
    /// Create a new text chunk.
    pub fn new(keyword: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            text: text.into(),
        }
    }

    /// Decode a `tEXt`, `zTXt` or `iTXt` chunk.
    ///
    /// Returns `Ok(None)` for non-text chunks. `max_text` bounds the inflated
    /// size of compressed payloads.
    pub fn decode(chunk: &ChunkRef<'_>, max_text: usize) -> Result<Option<Self>> {
        match chunk.kind {
            kind::TEXT => decode_text(chunk.data).map(Some),
            kind::ZTXT => decode_ztxt(chunk.data, max_text).map(Some),
            kind::ITXT => decode_itxt(chunk.data, max_text).map(Some),
            _ => Ok(None),
        }
    }

    /// Encode as a `tEXt` chunk payload.
    pub fn encode_text(&self) -> Result<Vec<u8>> {
        validate_keyword(&self.keyword)?;

        let mut out = Vec::with_capacity(self.keyword.len() + 1 + self.text.len());
        out.extend(self.keyword.chars().map(|c| c as u8));
        out.push(0);
        for c in self.text.chars() {
            let code = c as u32;
            if code > 0xFF {
                return Err(Error::InvalidText {
                    kind: "tEXt",
                    reason: format!("character {c:?} is not Latin-1"),
                });
            }
            out.push(code as u8);
        }
        Ok(out)
    }
}

fn validate_keyword(keyword: &str) -> Result<()> {
    let count = keyword.chars().count();
    if count == 0 || count > 79 || keyword.chars().any(|c| c as u32 > 0xFF || c == '\0') {
        return Err(Error::InvalidKeyword(keyword.to_string()));
    }
    Ok(())
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn decode_text(data: &[u8]) -> Result<TextChunk> {
    let mut reader = BinaryReader::new(data);
    let keyword = reader
        .read_latin1_cstring()
        .map_err(|_| missing_separator("tEXt"))?;
    Ok(TextChunk {
        keyword,
        text: latin1(reader.remaining_bytes()),
    })
}

fn decode_ztxt(data: &[u8], max_text: usize) -> Result<TextChunk> {
    let mut reader = BinaryReader::new(data);
    let keyword = reader
        .read_latin1_cstring()
        .map_err(|_| missing_separator("zTXt"))?;
    let method = reader.read_u8()?;
    if method != 0 {
        return Err(Error::InvalidText {
            kind: "zTXt",
            reason: format!("unknown compression method {method}"),
        });
    }
    let inflated = inflate(reader.remaining_bytes(), max_text)?;
    Ok(TextChunk {
        keyword,
        text: latin1(&inflated),
    })
}

fn decode_itxt(data: &[u8], max_text: usize) -> Result<TextChunk> {
    let mut reader = BinaryReader::new(data);
    let keyword = reader
        .read_latin1_cstring()
        .map_err(|_| missing_separator("iTXt"))?;
    let compressed = reader.read_u8()? != 0;
    let _method = reader.read_u8()?;
    let _language = reader
        .read_latin1_cstring()
        .map_err(|_| missing_separator("iTXt"))?;
    // The translated keyword is UTF-8, but only its length matters here.
    let _translated = reader
        .read_latin1_cstring()
        .map_err(|_| missing_separator("iTXt"))?;

    let raw = reader.remaining_bytes();
    let bytes = if compressed {
        inflate(raw, max_text)?
    } else {
        raw.to_vec()
    };

    let text = String::from_utf8(bytes).map_err(|e| Error::InvalidText {
        kind: "iTXt",
        reason: e.to_string(),
    })?;
    Ok(TextChunk { keyword, text })
}

fn inflate(data: &[u8], max_text: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .take(max_text as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| Error::Decompression(e.to_string()))?;

    if out.len() > max_text {
        return Err(Error::Decompression(format!(
            "text chunk inflates beyond {max_text} bytes"
        )));
    }
    Ok(out)
}

fn missing_separator(kind: &'static str) -> Error {
    Error::InvalidText {
        kind,
        reason: "missing keyword separator".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use super::*;

    fn chunk<'a>(chunk_kind: [u8; 4], data: &'a [u8]) -> ChunkRef<'a> {
        ChunkRef {
            kind: chunk_kind,
            data,
            offset: 0,
            crc: 0,
        }
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_text_encode_decode() {
        let original = TextChunk::new("chara", "eyJuYW1lIjoiQXZhIn0=");
        let payload = original.encode_text().unwrap();
        let decoded = TextChunk::decode(&chunk(kind::TEXT, &payload), 1024)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_ztxt_decode() {
        let mut payload = b"ccv3\0\0".to_vec();
        payload.extend(zlib(b"compressed card"));
        let decoded = TextChunk::decode(&chunk(kind::ZTXT, &payload), 1024)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.keyword, "ccv3");
        assert_eq!(decoded.text, "compressed card");
    }

    #[test]
    fn test_itxt_decode_uncompressed_and_compressed() {
        let plain = b"chara\0\0\0en\0\0h\xC3\xA9llo".to_vec();
        let decoded = TextChunk::decode(&chunk(kind::ITXT, &plain), 1024)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.text, "héllo");

        let mut compressed = b"chara\0\x01\0\0\0".to_vec();
        compressed.extend(zlib("héllo".as_bytes()));
        let decoded = TextChunk::decode(&chunk(kind::ITXT, &compressed), 1024)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.text, "héllo");
    }

    #[test]
    fn test_inflate_limit() {
        let mut payload = b"bomb\0\0".to_vec();
        payload.extend(zlib(&vec![b'a'; 4096]));
        assert!(matches!(
            TextChunk::decode(&chunk(kind::ZTXT, &payload), 100),
            Err(Error::Decompression(_))
        ));
    }

    #[test]
    fn test_invalid_keyword() {
        assert!(TextChunk::new("", "x").encode_text().is_err());
        assert!(TextChunk::new("k".repeat(80), "x").encode_text().is_err());
    }

    #[test]
    fn test_non_text_chunk() {
        assert!(TextChunk::decode(&chunk(kind::IDAT, b"\0"), 10)
            .unwrap()
            .is_none());
    }
}
