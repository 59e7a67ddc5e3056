//! The canonical card record.
//!
//! Every container is decoded into a [`CardRecord`] and encoded from one.
//! Fields the model does not name are kept in `extra` maps so that a
//! round-trip through any container never loses data written by other tools.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::asset::AssetDescriptor;
use crate::de::{
    default_true, lenient_bool_true, lenient_i64, lenient_map, lenient_opt_i64,
    lenient_opt_string, lenient_string, lenient_string_vec,
};
use crate::Result;

/// `spec` value of a V2 wrapper.
pub const SPEC_V2: &str = "chara_card_v2";
/// `spec` value of a V3 wrapper.
pub const SPEC_V3: &str = "chara_card_v3";

/// Card spec version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpecVersion {
    V2,
    V3,
}

impl SpecVersion {
    /// The wrapper's `spec` string.
    pub fn spec(self) -> &'static str {
        match self {
            Self::V2 => SPEC_V2,
            Self::V3 => SPEC_V3,
        }
    }

    /// The wrapper's `spec_version` string.
    pub fn spec_version(self) -> &'static str {
        match self {
            Self::V2 => "2.0",
            Self::V3 => "3.0",
        }
    }

    /// Parse a `spec` string.
    pub fn from_spec(spec: &str) -> Option<Self> {
        match spec {
            SPEC_V2 => Some(Self::V2),
            SPEC_V3 => Some(Self::V3),
            _ => None,
        }
    }
}

impl std::fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.spec_version())
    }
}

/// Card payload shared by both spec versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub personality: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub scenario: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_mes: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mes_example: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub creator_notes: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub system_prompt: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub post_history_instructions: String,
    #[serde(default, deserialize_with = "lenient_string_vec")]
    pub alternate_greetings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_book: Option<CharacterBook>,
    #[serde(default, deserialize_with = "lenient_string_vec")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub creator: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub character_version: String,
    #[serde(default, deserialize_with = "lenient_map")]
    pub extensions: Map<String, Value>,

    // V3 additions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<AssetDescriptor>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub nickname: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub group_only_greetings: Vec<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub source: Vec<String>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub creation_date: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub modification_date: Option<i64>,

    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CardData {
    /// Create a record payload with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Stable identifier for the card, if the source carried one.
    ///
    /// Looks at `extensions.id`, `extensions.voxta.id` and a top-level `id`.
    pub fn source_id(&self) -> Option<&str> {
        self.extensions
            .get("id")
            .and_then(Value::as_str)
            .or_else(|| {
                self.extensions
                    .get("voxta")
                    .and_then(|v| v.get("id"))
                    .and_then(Value::as_str)
            })
            .or_else(|| self.extra.get("id").and_then(Value::as_str))
    }
}

/// Embedded lorebook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterBook {
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub scan_depth: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub token_budget: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursive_scanning: Option<bool>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub extensions: Map<String, Value>,
    #[serde(default)]
    pub entries: Vec<BookEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One lorebook entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookEntry {
    #[serde(default, deserialize_with = "lenient_string_vec")]
    pub keys: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: String,
    #[serde(default, deserialize_with = "lenient_map")]
    pub extensions: Map<String, Value>,
    #[serde(default = "default_true", deserialize_with = "lenient_bool_true")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub insertion_order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selective: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient_string_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub secondary_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub position: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BookEntry {
    /// Create an enabled entry.
    pub fn new(keys: Vec<String>, content: impl Into<String>) -> Self {
        Self {
            keys,
            content: content.into(),
            extensions: Map::new(),
            enabled: true,
            insertion_order: 0,
            case_sensitive: None,
            name: None,
            priority: None,
            id: None,
            comment: None,
            selective: None,
            secondary_keys: Vec::new(),
            constant: None,
            position: None,
            extra: Map::new(),
        }
    }
}

/// A canonical character card.
#[derive(Debug, Clone, PartialEq)]
pub enum CardRecord {
    V2(CardData),
    V3(CardData),
}

#[derive(Serialize)]
struct Wire<'a> {
    spec: &'static str,
    spec_version: &'static str,
    data: &'a CardData,
}

impl Serialize for CardRecord {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let version = self.version();
        Wire {
            spec: version.spec(),
            spec_version: version.spec_version(),
            data: self.data(),
        }
        .serialize(serializer)
    }
}

impl CardRecord {
    /// Wrap `data` in the given version.
    pub fn new(version: SpecVersion, data: CardData) -> Self {
        match version {
            SpecVersion::V2 => Self::V2(data),
            SpecVersion::V3 => Self::V3(data),
        }
    }

    pub fn version(&self) -> SpecVersion {
        match self {
            Self::V2(_) => SpecVersion::V2,
            Self::V3(_) => SpecVersion::V3,
        }
    }

    pub fn data(&self) -> &CardData {
        match self {
            Self::V2(d) | Self::V3(d) => d,
        }
    }

    pub fn data_mut(&mut self) -> &mut CardData {
        match self {
            Self::V2(d) | Self::V3(d) => d,
        }
    }

    pub fn into_data(self) -> CardData {
        match self {
            Self::V2(d) | Self::V3(d) => d,
        }
    }

    pub fn name(&self) -> &str {
        &self.data().name
    }

    pub fn assets(&self) -> &[AssetDescriptor] {
        &self.data().assets
    }

    /// Upgrade to V3. Asset-carrying containers always write V3.
    pub fn into_v3(self) -> Self {
        Self::V3(self.into_data())
    }

    /// Serialize to a `serde_json::Value`.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapper_shape() {
        let record = CardRecord::V3(CardData::named("Ava"));
        let value = record.to_value().unwrap();
        assert_eq!(value["spec"], "chara_card_v3");
        assert_eq!(value["spec_version"], "3.0");
        assert_eq!(value["data"]["name"], "Ava");
        assert!(value["data"].get("assets").is_none());
        assert!(value["data"].get("nickname").is_none());
    }

    #[test]
    fn test_unknown_fields_survive() {
        let json = r#"{"name":"Ava","x_custom":{"a":1},"creator":null}"#;
        let data: CardData = serde_json::from_str(json).unwrap();
        assert_eq!(data.creator, "");
        assert_eq!(data.extra["x_custom"]["a"], 1);

        let back = serde_json::to_value(&data).unwrap();
        assert_eq!(back["x_custom"]["a"], 1);
    }

    #[test]
    fn test_book_entry_defaults() {
        let entry: BookEntry =
            serde_json::from_str(r#"{"keys":"dragon","content":"Big.","insertion_order":2.5}"#)
                .unwrap();
        assert!(entry.enabled);
        assert_eq!(entry.keys, vec!["dragon"]);
        assert_eq!(entry.insertion_order, 2);
    }

    #[test]
    fn test_source_id_lookup() {
        let mut data = CardData::named("Ava");
        assert_eq!(data.source_id(), None);
        data.extensions
            .insert("voxta".into(), serde_json::json!({"id": "abc"}));
        assert_eq!(data.source_id(), Some("abc"));
    }
}
