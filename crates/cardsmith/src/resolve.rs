//! Asset address resolution.
//!
//! Card records reference their assets through several historical
//! addressing schemes. Resolution tries, in order:
//!
//! 1. `data:` URIs, decoded in place
//! 2. the PNG extra chunk table, first by exact candidate keys built from
//!    [`CHUNK_KEY_PREFIXES`], then by a scan of `chara-ext-asset_*` keys
//! 3. archive members, by exact then case-insensitive path
//! 4. `http(s)://` and `ccdefault:` become [`Resolution::Remote`]; anything
//!    else is [`Resolution::Unresolved`]
//!
//! No step is fatal. Every descriptor comes back as exactly one
//! [`Resolution`], in input order.

use std::collections::BTreeMap;
use std::io::Cursor;

use cardsmith_card::asset::{decode_base64, decode_data_uri};
use cardsmith_card::{AssetDescriptor, AssetUri};
use cardsmith_common::mime;
use cardsmith_png::TextChunk;

/// Prefixes that turn an asset id into a candidate chunk keyword, tried in
/// this order.
pub const CHUNK_KEY_PREFIXES: [&str; 6] = [
    "",
    "__asset:",
    "asset:",
    "__asset_",
    "chara-ext-asset_",
    "chara-ext-asset_:",
];

/// URI prefixes that wrap an asset id.
const REFERENCE_PREFIXES: [&str; 2] = ["__asset:", "asset:"];

/// Keyword prefix of side-channel asset chunks.
pub const SIDE_CHUNK_PREFIX: &str = "chara-ext-asset_";

/// Byte sources available for one card.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteSources<'a> {
    /// PNG text chunks other than the card chunk.
    pub chunks: Option<&'a [TextChunk]>,
    /// Archive members keyed by path.
    pub entries: Option<&'a BTreeMap<String, Vec<u8>>>,
}

/// Where resolved bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSource {
    DataUri,
    ChunkKey,
    ChunkScan,
    Archive,
    /// The PNG container image itself.
    Container,
}

/// An asset with its bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAsset {
    pub descriptor: AssetDescriptor,
    pub buffer: Vec<u8>,
    pub mimetype: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub source: AssetSource,
}

impl ResolvedAsset {
    /// Build from bytes, sniffing the MIME type and reading image dimensions.
    pub fn new(descriptor: AssetDescriptor, buffer: Vec<u8>, source: AssetSource) -> Self {
        let mimetype = mime::detect(&buffer, &descriptor.ext).to_owned();
        Self::with_mimetype(descriptor, buffer, mimetype, source)
    }

    /// Build with a known MIME type (used for `data:` URIs).
    pub fn with_mimetype(
        mut descriptor: AssetDescriptor,
        buffer: Vec<u8>,
        declared: String,
        source: AssetSource,
    ) -> Self {
        let mimetype = match mime::sniff(&buffer) {
            Some(sniffed) => sniffed.to_owned(),
            None if declared.is_empty() => mime::OCTET_STREAM.to_owned(),
            None => declared,
        };
        if descriptor.ext.is_empty() {
            if let Some(ext) = mime::extension_for(&mimetype) {
                descriptor.ext = ext.to_owned();
            }
        }
        let (width, height) = if mime::is_image(&mimetype) {
            dimensions(&buffer).unzip()
        } else {
            (None, None)
        };

        Self {
            descriptor,
            buffer,
            mimetype,
            width,
            height,
            source,
        }
    }
}

/// Read image dimensions from the header without decoding pixels.
pub fn dimensions(data: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Per-descriptor outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Bytes found.
    Resolved(ResolvedAsset),
    /// Intentionally not materialized (`http(s)://`, `ccdefault:`); the
    /// descriptor is kept as-is.
    Remote(AssetDescriptor),
    /// No source matched; the descriptor is kept and a warning raised.
    Unresolved {
        descriptor: AssetDescriptor,
        reason: String,
    },
}

impl Resolution {
    pub fn descriptor(&self) -> &AssetDescriptor {
        match self {
            Self::Resolved(asset) => &asset.descriptor,
            Self::Remote(descriptor) | Self::Unresolved { descriptor, .. } => descriptor,
        }
    }

    pub fn descriptor_mut(&mut self) -> &mut AssetDescriptor {
        match self {
            Self::Resolved(asset) => &mut asset.descriptor,
            Self::Remote(descriptor) | Self::Unresolved { descriptor, .. } => descriptor,
        }
    }

    pub fn as_resolved(&self) -> Option<&ResolvedAsset> {
        match self {
            Self::Resolved(asset) => Some(asset),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Warning text for unresolved descriptors.
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Unresolved { descriptor, reason } => Some(format!(
                "asset '{}' ({}) unresolved: {reason}",
                descriptor.name, descriptor.uri
            )),
            _ => None,
        }
    }
}

/// Candidate chunk keywords for an asset id, in priority order.
pub fn candidate_keys(id: &str) -> impl Iterator<Item = String> + '_ {
    CHUNK_KEY_PREFIXES
        .iter()
        .map(move |prefix| format!("{prefix}{id}"))
}

/// The id an asset URI refers to in the chunk table.
fn chunk_id(uri: &str) -> &str {
    REFERENCE_PREFIXES
        .iter()
        .find_map(|prefix| uri.strip_prefix(prefix))
        .unwrap_or(uri)
}

/// Normalized suffix used by the side-chunk prefix scan.
fn scan_suffix(key: &str) -> &str {
    key.strip_prefix(SIDE_CHUNK_PREFIX)
        .unwrap_or(key)
        .trim_start_matches(':')
}

fn find_chunk<'c>(uri: &str, chunks: &'c [TextChunk]) -> Option<(&'c TextChunk, AssetSource)> {
    let id = chunk_id(uri);
    if id.is_empty() {
        return None;
    }

    for key in candidate_keys(id) {
        if let Some(chunk) = chunks.iter().find(|c| c.keyword == key) {
            return Some((chunk, AssetSource::ChunkKey));
        }
    }

    let wanted = scan_suffix(id);
    let mut matches = chunks
        .iter()
        .filter(|c| c.keyword.starts_with(SIDE_CHUNK_PREFIX) && scan_suffix(&c.keyword) == wanted);
    let first = matches.next()?;
    let others = matches.count();
    if others > 0 {
        tracing::debug!(
            uri,
            keyword = %first.keyword,
            others,
            "several side chunks match, using the first"
        );
    }
    Some((first, AssetSource::ChunkScan))
}

fn find_entry<'e>(path: &str, entries: &'e BTreeMap<String, Vec<u8>>) -> Option<&'e Vec<u8>> {
    let path = path.trim_start_matches("./").trim_start_matches('/');
    entries.get(path).or_else(|| {
        entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(path))
            .map(|(_, data)| data)
    })
}

/// Resolve one descriptor.
pub fn resolve(descriptor: &AssetDescriptor, sources: &ByteSources<'_>) -> Resolution {
    let unresolved = |reason: String| Resolution::Unresolved {
        descriptor: descriptor.clone(),
        reason,
    };

    let uri = descriptor.parsed_uri();

    if let AssetUri::Data {
        mimetype,
        base64,
        payload,
    } = uri
    {
        return match decode_data_uri(base64, payload) {
            Ok(buffer) => Resolution::Resolved(ResolvedAsset::with_mimetype(
                descriptor.clone(),
                buffer,
                mimetype.to_owned(),
                AssetSource::DataUri,
            )),
            Err(e) => unresolved(format!("bad data URI: {e}")),
        };
    }

    if let (Some(chunks), AssetUri::Other(raw)) = (sources.chunks, &uri) {
        if let Some((chunk, source)) = find_chunk(raw, chunks) {
            tracing::debug!(uri = raw, keyword = %chunk.keyword, ?source, "resolved from chunk table");
            return match decode_base64(&chunk.text) {
                Ok(buffer) => Resolution::Resolved(ResolvedAsset::new(
                    descriptor.clone(),
                    buffer,
                    source,
                )),
                Err(e) => unresolved(format!("chunk '{}' is not base64: {e}", chunk.keyword)),
            };
        }
    }

    if let Some(entries) = sources.entries {
        let path = match uri {
            AssetUri::Embedded(path) | AssetUri::Other(path) => Some(path),
            _ => None,
        };
        if let Some(path) = path.filter(|p| !p.is_empty()) {
            if let Some(data) = find_entry(path, entries) {
                tracing::debug!(path, size = data.len(), "resolved from archive");
                return Resolution::Resolved(ResolvedAsset::new(
                    descriptor.clone(),
                    data.clone(),
                    AssetSource::Archive,
                ));
            }
            if matches!(uri, AssetUri::Embedded(_)) {
                return unresolved(format!("archive has no entry '{path}'"));
            }
        }
    }

    match uri {
        AssetUri::Remote(_) | AssetUri::Default => Resolution::Remote(descriptor.clone()),
        AssetUri::Embedded(path) => unresolved(format!("no archive to look up '{path}'")),
        _ => unresolved("no source matches the URI".into()),
    }
}

/// Resolve every descriptor, keeping input order.
#[cfg(not(feature = "parallel"))]
pub fn resolve_all(descriptors: &[AssetDescriptor], sources: &ByteSources<'_>) -> Vec<Resolution> {
    descriptors.iter().map(|d| resolve(d, sources)).collect()
}

/// Resolve every descriptor in parallel, keeping input order.
#[cfg(feature = "parallel")]
pub fn resolve_all(descriptors: &[AssetDescriptor], sources: &ByteSources<'_>) -> Vec<Resolution> {
    use rayon::prelude::*;

    descriptors.par_iter().map(|d| resolve(d, sources)).collect()
}
