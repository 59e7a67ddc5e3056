//! Asset descriptors and the URI schemes they use.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::de::lenient_string;
use crate::{Error, Result};

/// Scheme used by CHARX archives to reference members (the misspelling is
/// part of the format).
pub const EMBEDDED_SCHEME: &str = "embeded://";

/// Scheme meaning "the container's own default image".
pub const DEFAULT_SCHEME: &str = "ccdefault:";

/// Well-known asset types.
pub mod kind {
    pub const ICON: &str = "icon";
    pub const BACKGROUND: &str = "background";
    pub const EMOTION: &str = "emotion";
    pub const USER_ICON: &str = "user_icon";
    pub const SOUND: &str = "sound";
    pub const OTHER: &str = "other";
}

/// Semantic tags carried by assets.
pub mod tags {
    pub const PORTRAIT_OVERRIDE: &str = "portrait-override";
    pub const MAIN_BACKGROUND: &str = "main-background";
    pub const EXPRESSION: &str = "expression";
    pub const ANIMATED: &str = "animated";
    pub const VOICE: &str = "voice";

    /// Prefixes of the positional tags derived from package avatar names.
    pub const EMOTION_PREFIX: &str = "emotion:";
    pub const STATE_PREFIX: &str = "state:";
    pub const VARIANT_PREFIX: &str = "variant:";

    const ACTOR_PREFIX: &str = "actor-";

    /// Parse `actor-<n>` into `n`.
    pub fn actor_index(tag: &str) -> Option<u32> {
        tag.strip_prefix(ACTOR_PREFIX)?.parse().ok()
    }

    /// Whether a source tag survives import.
    pub fn is_recognized(tag: &str) -> bool {
        matches!(
            tag,
            PORTRAIT_OVERRIDE | MAIN_BACKGROUND | EXPRESSION | ANIMATED | VOICE
        ) || actor_index(tag).is_some()
            || tag.starts_with(EMOTION_PREFIX)
            || tag.starts_with(STATE_PREFIX)
            || tag.starts_with(VARIANT_PREFIX)
    }
}

/// A reference to one asset inside a card record, before byte resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Asset type (`icon`, `background`, `emotion`, ...).
    #[serde(rename = "type", deserialize_with = "lenient_string", default)]
    pub kind: String,
    /// Format-local reference.
    #[serde(deserialize_with = "lenient_string", default)]
    pub uri: String,
    /// Asset name, unique within a card after export validation.
    #[serde(deserialize_with = "lenient_string", default)]
    pub name: String,
    /// File extension without the dot.
    #[serde(deserialize_with = "lenient_string", default)]
    pub ext: String,
    /// Semantic tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Explicit main-asset flag from the source.
    #[serde(rename = "isMain", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_main: bool,
    /// Position within the record's asset list.
    #[serde(skip)]
    pub order_index: usize,
}

impl AssetDescriptor {
    /// Create a descriptor.
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        ext: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            uri: uri.into(),
            name: name.into(),
            ext: ext.into(),
            tags: Vec::new(),
            is_main: false,
            order_index: 0,
        }
    }

    /// Whether this is an icon named `main`.
    pub fn is_main_icon_by_name(&self) -> bool {
        self.kind == kind::ICON && self.name == "main"
    }

    /// Whether the descriptor carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Add a tag unless already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.has_tag(&tag) {
            self.tags.push(tag);
        }
    }

    /// Parsed view of the URI.
    pub fn parsed_uri(&self) -> AssetUri<'_> {
        AssetUri::parse(&self.uri)
    }
}

/// A classified asset URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetUri<'a> {
    /// `data:<mime>[;base64],<payload>`.
    Data {
        mimetype: &'a str,
        base64: bool,
        payload: &'a str,
    },
    /// `embeded://<path>` (also accepts the `embedded://` spelling).
    Embedded(&'a str),
    /// `http://` or `https://`.
    Remote(&'a str),
    /// `ccdefault:` with anything after it.
    Default,
    /// Anything else (chunk keys, bare paths, unknown schemes).
    Other(&'a str),
}

impl<'a> AssetUri<'a> {
    /// Classify a URI string.
    pub fn parse(uri: &'a str) -> Self {
        let trimmed = uri.trim();

        if let Some(rest) = strip_prefix_ignore_case(trimmed, "data:") {
            if let Some((meta, payload)) = rest.split_once(',') {
                let base64 = meta.to_ascii_lowercase().ends_with(";base64");
                let mimetype = meta.split(';').next().unwrap_or("");
                return Self::Data {
                    mimetype,
                    base64,
                    payload,
                };
            }
            return Self::Other(trimmed);
        }
        if let Some(path) = strip_prefix_ignore_case(trimmed, EMBEDDED_SCHEME)
            .or_else(|| strip_prefix_ignore_case(trimmed, "embedded://"))
        {
            return Self::Embedded(path);
        }
        if strip_prefix_ignore_case(trimmed, "http://").is_some()
            || strip_prefix_ignore_case(trimmed, "https://").is_some()
        {
            return Self::Remote(trimmed);
        }
        if strip_prefix_ignore_case(trimmed, DEFAULT_SCHEME).is_some() {
            return Self::Default;
        }
        Self::Other(trimmed)
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// Decode the payload of a `data:` URI.
pub fn decode_data_uri(base64: bool, payload: &str) -> Result<Vec<u8>> {
    if base64 {
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        return Ok(STANDARD.decode(cleaned.trim_end_matches('=').to_string() + padding(&cleaned))?);
    }
    percent_decode(payload)
}

/// Re-pad a base64 string whose padding may have been stripped.
fn padding(cleaned: &str) -> &'static str {
    match cleaned.trim_end_matches('=').len() % 4 {
        2 => "==",
        3 => "=",
        _ => "",
    }
}

fn percent_decode(payload: &str) -> Result<Vec<u8>> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = payload
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| Error::InvalidDataUri(format!("bad escape at {i}")))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

/// Encode bytes as a base64 `data:` URI.
pub fn encode_data_uri(mimetype: &str, data: &[u8]) -> String {
    format!("data:{mimetype};base64,{}", STANDARD.encode(data))
}

/// Decode standard base64, tolerating whitespace and missing padding.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    decode_data_uri(true, text)
}

/// Encode bytes as standard base64.
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}
