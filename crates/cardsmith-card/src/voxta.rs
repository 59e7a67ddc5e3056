//! Voxta package model.
//!
//! A package is a ZIP archive with one directory per character, scenario and
//! memory book, each keyed by a UUID:
//!
//! ```text
//! package.json
//! Characters/<uuid>/character.json
//! Characters/<uuid>/thumbnail.png
//! Characters/<uuid>/Assets/Avatars/Default/<Emotion>_<State>_<Variant>.webp
//! Characters/<uuid>/Assets/VoiceSamples/<file>
//! Books/<uuid>/book.json
//! Scenarios/<uuid>/scenario.json
//! ```
//!
//! This module holds the JSON documents and the pure mappings between a
//! package character and the canonical record. Archive I/O lives in the
//! pipeline crate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::asset::{kind, tags};
use crate::de::{lenient_i64, lenient_string, lenient_string_vec};
use crate::record::{BookEntry, CardData, CardRecord, CharacterBook};

/// Extension key under which package-only character fields are kept.
pub const EXTENSION_KEY: &str = "voxta";

pub const CHARACTERS_DIR: &str = "Characters";
pub const BOOKS_DIR: &str = "Books";
pub const SCENARIOS_DIR: &str = "Scenarios";
pub const PACKAGE_FILE: &str = "package.json";
pub const CHARACTER_FILE: &str = "character.json";
pub const BOOK_FILE: &str = "book.json";
pub const SCENARIO_FILE: &str = "scenario.json";

/// `character.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoxtaCharacter {
    #[serde(rename = "$type", default = "character_type")]
    pub type_tag: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub personality: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub profile: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub scenario: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_message: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message_examples: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub system_prompt: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub post_history_instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub creator: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub creator_notes: String,
    #[serde(default, deserialize_with = "lenient_string_vec")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_vec")]
    pub memory_books: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_modified: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn character_type() -> String {
    "character".into()
}

fn book_type() -> String {
    "memoryBook".into()
}

fn package_type() -> String {
    "package".into()
}

/// `book.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoxtaBook {
    #[serde(rename = "$type", default = "book_type")]
    pub type_tag: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<VoxtaBookItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoxtaBookItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string_vec")]
    pub keywords: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub weight: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `package.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoxtaPackage {
    #[serde(rename = "$type", default = "package_type")]
    pub type_tag: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_content: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_resource: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_resource: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `scenario.json`. Only identity fields are modelled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoxtaScenario {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Map a package character (and its linked memory books) to a V3 record.
///
/// Fields without a canonical counterpart are kept under
/// `extensions.voxta` so that [`from_canonical`] can restore them.
pub fn to_canonical(character: &VoxtaCharacter, books: &[&VoxtaBook]) -> CardRecord {
    let mut ext = Map::new();
    ext.insert("id".into(), Value::String(character.id.clone()));
    let optional = [
        ("packageId", &character.package_id),
        ("label", &character.label),
        ("context", &character.context),
        ("instructions", &character.instructions),
        ("culture", &character.culture),
        ("dateCreated", &character.date_created),
        ("dateModified", &character.date_modified),
    ];
    for (key, value) in optional {
        if let Some(v) = value {
            ext.insert(key.into(), Value::String(v.clone()));
        }
    }
    if !character.profile.is_empty() {
        ext.insert("profile".into(), Value::String(character.profile.clone()));
    }
    if !character.memory_books.is_empty() {
        ext.insert(
            "memoryBooks".into(),
            Value::Array(character.memory_books.iter().cloned().map(Value::String).collect()),
        );
    }
    for (k, v) in &character.extra {
        ext.insert(k.clone(), v.clone());
    }

    let mut data = CardData {
        name: character.name.clone(),
        description: character.description.clone(),
        personality: character.personality.clone(),
        scenario: character.scenario.clone(),
        first_mes: character.first_message.clone(),
        mes_example: character.message_examples.clone(),
        creator_notes: character.creator_notes.clone(),
        system_prompt: character.system_prompt.clone(),
        post_history_instructions: character.post_history_instructions.clone(),
        tags: character.tags.clone(),
        creator: character.creator.clone(),
        character_version: character.version.clone().unwrap_or_default(),
        character_book: (!books.is_empty()).then(|| book_to_lorebook(books)),
        ..CardData::default()
    };
    data.extensions
        .insert(EXTENSION_KEY.into(), Value::Object(ext));

    CardRecord::V3(data)
}

/// Map a canonical record back to a package character with the given id.
pub fn from_canonical(data: &CardData, id: &str) -> VoxtaCharacter {
    let ext = data
        .extensions
        .get(EXTENSION_KEY)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let text = |key: &str| ext.get(key).and_then(Value::as_str).map(str::to_owned);

    let mut extra = Map::new();
    for (k, v) in &ext {
        if k.starts_with(|c: char| c.is_ascii_uppercase()) {
            extra.insert(k.clone(), v.clone());
        }
    }

    VoxtaCharacter {
        type_tag: character_type(),
        id: id.to_owned(),
        package_id: text("packageId"),
        name: data.name.clone(),
        label: text("label"),
        description: data.description.clone(),
        personality: data.personality.clone(),
        profile: text("profile").unwrap_or_default(),
        scenario: data.scenario.clone(),
        first_message: data.first_mes.clone(),
        message_examples: data.mes_example.clone(),
        system_prompt: data.system_prompt.clone(),
        post_history_instructions: data.post_history_instructions.clone(),
        context: text("context"),
        instructions: text("instructions"),
        culture: text("culture"),
        creator: data.creator.clone(),
        creator_notes: data.creator_notes.clone(),
        tags: data.tags.clone(),
        version: (!data.character_version.is_empty()).then(|| data.character_version.clone()),
        memory_books: Vec::new(),
        date_created: text("dateCreated"),
        date_modified: text("dateModified"),
        extra,
    }
}

/// Merge memory books into one lorebook.
pub fn book_to_lorebook(books: &[&VoxtaBook]) -> CharacterBook {
    let mut lorebook = CharacterBook {
        name: books.first().map(|b| b.name.clone()).filter(|n| !n.is_empty()),
        description: books.first().and_then(|b| b.description.clone()),
        ..CharacterBook::default()
    };

    for book in books {
        for item in &book.items {
            let mut entry = BookEntry::new(item.keywords.clone(), item.text.clone());
            entry.insertion_order = item.weight;
            entry.enabled = !item.deleted;
            if !item.id.is_empty() {
                entry.id = Some(Value::String(item.id.clone()));
            }
            lorebook.entries.push(entry);
        }
    }

    let ids: Vec<Value> = books.iter().map(|b| Value::String(b.id.clone())).collect();
    let mut ext = Map::new();
    ext.insert("bookIds".into(), Value::Array(ids));
    lorebook
        .extensions
        .insert(EXTENSION_KEY.into(), Value::Object(ext));

    lorebook
}

/// Map a lorebook to one memory book.
///
/// Entries without a string id get `item_id(index)`.
pub fn lorebook_to_book(
    lorebook: &CharacterBook,
    id: &str,
    fallback_name: &str,
    item_id: impl Fn(usize) -> String,
) -> VoxtaBook {
    let items = lorebook
        .entries
        .iter()
        .enumerate()
        .map(|(i, entry)| VoxtaBookItem {
            id: entry
                .id
                .as_ref()
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| item_id(i)),
            keywords: entry.keys.clone(),
            text: entry.content.clone(),
            weight: entry.insertion_order,
            deleted: !entry.enabled,
            extra: Map::new(),
        })
        .collect();

    VoxtaBook {
        type_tag: book_type(),
        id: id.to_owned(),
        package_id: None,
        name: lorebook
            .name
            .clone()
            .unwrap_or_else(|| fallback_name.to_owned()),
        description: lorebook.description.clone(),
        items,
        extra: Map::new(),
    }
}

/// Positional tags from an avatar file stem `<Emotion>_<State>_<Variant>`.
///
/// Fewer segments yield fewer tags; segments past the third are folded into
/// the variant.
pub fn avatar_tags(stem: &str) -> Vec<String> {
    let mut parts = stem.splitn(3, '_').filter(|p| !p.is_empty());
    let prefixes = [tags::EMOTION_PREFIX, tags::STATE_PREFIX, tags::VARIANT_PREFIX];

    prefixes
        .iter()
        .filter_map(|prefix| parts.next().map(|p| format!("{prefix}{}", p.to_lowercase())))
        .collect()
}

/// An asset file found under a character directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageAsset {
    pub kind: String,
    pub name: String,
    pub ext: String,
    pub tags: Vec<String>,
    /// The character thumbnail (main icon).
    pub is_thumbnail: bool,
}

/// Classify a path relative to `Characters/<id>/`.
pub fn classify_character_path(rel: &str) -> Option<PackageAsset> {
    let (dir, file) = rel.rsplit_once('/').unwrap_or(("", rel));
    let (stem, ext) = file.rsplit_once('.').unwrap_or((file, ""));
    if stem.is_empty() {
        return None;
    }
    let asset = |asset_kind: &str, tags: Vec<String>, is_thumbnail: bool| PackageAsset {
        kind: asset_kind.to_owned(),
        name: stem.to_owned(),
        ext: ext.to_ascii_lowercase(),
        tags,
        is_thumbnail,
    };

    if dir.is_empty() {
        if !stem.eq_ignore_ascii_case("thumbnail") {
            return None;
        }
        // The thumbnail is the main portrait; other formats name it `main`.
        let mut thumb = asset(kind::ICON, Vec::new(), true);
        thumb.name = "main".to_owned();
        return Some(thumb);
    }

    let mut segments = dir.split('/');
    if !segments.next()?.eq_ignore_ascii_case("Assets") {
        return None;
    }
    let group = segments.next()?;

    if group.eq_ignore_ascii_case("Avatars") {
        Some(asset(kind::EMOTION, avatar_tags(stem), false))
    } else if group.eq_ignore_ascii_case("VoiceSamples") {
        Some(asset(kind::SOUND, vec![tags::VOICE.to_owned()], false))
    } else {
        Some(asset(&group.to_lowercase(), Vec::new(), false))
    }
}

/// Path relative to `Characters/<id>/` for an exported asset.
///
/// `name` and `ext` must already be safe path segments.
pub fn placement(asset_kind: &str, name: &str, ext: &str, is_main: bool) -> String {
    if is_main {
        return format!("thumbnail.{ext}");
    }
    match asset_kind {
        kind::ICON | kind::EMOTION => format!("Assets/Avatars/Default/{name}.{ext}"),
        kind::SOUND => format!("Assets/VoiceSamples/{name}.{ext}"),
        other => {
            let mut chars = other.chars();
            let folder: String = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => "Other".to_owned(),
            };
            format!("Assets/{folder}/{name}.{ext}")
        }
    }
}

/// Split `Characters/<id>/<rest>` into `(id, rest)`.
pub fn split_character_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix(CHARACTERS_DIR)?.strip_prefix('/')?;
    let (id, rest) = rest.split_once('/')?;
    (!id.is_empty()).then_some((id, rest))
}

/// Whether an archive entry is a character document.
pub fn is_character_entry(path: &str) -> bool {
    split_character_path(path).is_some_and(|(_, rest)| rest == CHARACTER_FILE)
}

/// Whether the `$type` field accepts this document as a character.
///
/// Missing tags are accepted; some writers omit them.
pub fn is_character_type(tag: &str) -> bool {
    tag.is_empty() || tag.eq_ignore_ascii_case("character")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_roundtrip_through_canonical() {
        let json = r#"{
            "$type": "character",
            "Id": "7d0f5f0e-0000-4000-8000-000000000001",
            "Name": "Ava",
            "Personality": "curious",
            "FirstMessage": "Hello!",
            "Culture": "en-US",
            "Profile": "A traveller.",
            "TextToSpeech": [{"Voice": "x"}],
            "Tags": ["fantasy"]
        }"#;
        let character: VoxtaCharacter = serde_json::from_str(json).unwrap();
        let record = to_canonical(&character, &[]);
        assert_eq!(record.name(), "Ava");
        assert_eq!(record.data().first_mes, "Hello!");
        assert_eq!(record.data().source_id(), Some("7d0f5f0e-0000-4000-8000-000000000001"));

        let back = from_canonical(record.data(), &character.id);
        assert_eq!(back.culture.as_deref(), Some("en-US"));
        assert_eq!(back.profile, "A traveller.");
        assert!(back.extra.contains_key("TextToSpeech"));
        assert_eq!(back.tags, vec!["fantasy"]);
    }

    #[test]
    fn test_books_merge_into_lorebook() {
        let book = VoxtaBook {
            id: "b1".into(),
            name: "World".into(),
            items: vec![
                VoxtaBookItem {
                    id: "i1".into(),
                    keywords: vec!["castle".into()],
                    text: "Old.".into(),
                    weight: 3,
                    ..VoxtaBookItem::default()
                },
                VoxtaBookItem {
                    deleted: true,
                    ..VoxtaBookItem::default()
                },
            ],
            ..VoxtaBook::default()
        };
        let lorebook = book_to_lorebook(&[&book]);
        assert_eq!(lorebook.name.as_deref(), Some("World"));
        assert_eq!(lorebook.entries.len(), 2);
        assert_eq!(lorebook.entries[0].insertion_order, 3);
        assert!(!lorebook.entries[1].enabled);

        let back = lorebook_to_book(&lorebook, "b2", "fallback", |i| format!("gen-{i}"));
        assert_eq!(back.items[0].id, "i1");
        assert_eq!(back.items[1].id, "gen-1");
        assert!(back.items[1].deleted);
    }

    #[test]
    fn test_avatar_tags_degrade() {
        assert_eq!(
            avatar_tags("Happy_Talking_2"),
            vec!["emotion:happy", "state:talking", "variant:2"]
        );
        assert_eq!(avatar_tags("Sad"), vec!["emotion:sad"]);
        assert_eq!(avatar_tags("Angry_Idle"), vec!["emotion:angry", "state:idle"]);
        assert_eq!(avatar_tags("A_B_C_D")[2], "variant:c_d");
    }

    #[test]
    fn test_classify_paths() {
        let thumb = classify_character_path("thumbnail.PNG").unwrap();
        assert!(thumb.is_thumbnail);
        assert_eq!(thumb.name, "main");
        assert_eq!(thumb.ext, "png");

        let avatar = classify_character_path("Assets/Avatars/Default/Happy_Idle_1.webp").unwrap();
        assert_eq!(avatar.kind, "emotion");
        assert_eq!(avatar.name, "Happy_Idle_1");
        assert_eq!(avatar.tags.len(), 3);

        let voice = classify_character_path("Assets/VoiceSamples/hello.wav").unwrap();
        assert_eq!(voice.kind, "sound");
        assert_eq!(voice.tags, vec!["voice"]);

        let bg = classify_character_path("Assets/Background/sunset.png").unwrap();
        assert_eq!(bg.kind, "background");

        assert!(classify_character_path("character.json").is_none());
    }

    #[test]
    fn test_placement_inverts_classification() {
        for (kind, is_main) in [("icon", true), ("emotion", false), ("sound", false), ("background", false)] {
            let path = placement(kind, "x", "png", is_main);
            let back = classify_character_path(&path).unwrap();
            assert_eq!(back.is_thumbnail, is_main);
            if !is_main {
                assert_eq!(back.kind, kind);
            }
        }
    }

    #[test]
    fn test_split_character_path() {
        assert_eq!(
            split_character_path("Characters/abc/character.json"),
            Some(("abc", "character.json"))
        );
        assert!(is_character_entry("Characters/abc/character.json"));
        assert!(!is_character_entry("Characters/abc/Assets/x.png"));
        assert!(split_character_path("Books/abc/book.json").is_none());
    }
}
