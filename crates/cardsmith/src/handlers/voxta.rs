//! Voxta packages.
//!
//! ```text
//! package.json
//! Characters/<uuid>/character.json
//! Characters/<uuid>/thumbnail.png
//! Characters/<uuid>/Assets/Avatars/Default/Happy_Idle_01.webp
//! Characters/<uuid>/Assets/VoiceSamples/hello.wav
//! Books/<uuid>/book.json
//! Scenarios/<uuid>/scenario.json
//! ```
//!
//! A package may hold several characters; each becomes one card. Export
//! writes one character per package.

use std::collections::{BTreeMap, HashSet};

use cardsmith_card::voxta::{
    self, VoxtaBook, VoxtaCharacter, VoxtaPackage, VoxtaScenario, BOOKS_DIR, BOOK_FILE,
    CHARACTERS_DIR, EXTENSION_KEY, PACKAGE_FILE, SCENARIOS_DIR, SCENARIO_FILE,
};
use cardsmith_card::{AssetDescriptor, CardData};
use cardsmith_zip::{is_zip, list_names, ArchiveWriter, CardArchive};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{preflight_warning, utf8_text};
use crate::config::PipelineConfig;
use crate::export::ExportBundle;
use crate::format::{CardFormat, Confidence, Hints};
use crate::handler::{Decoded, DecodedCard, Encoded, FormatHandler};
use crate::paths;
use crate::validate::RuleSet;
use crate::{Error, Result};

/// `EntryResource.Kind` for a character.
const RESOURCE_KIND_CHARACTER: u8 = 1;

/// Handler for `.voxpkg` packages.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoxtaHandler;

fn parse_document<T: DeserializeOwned>(path: &str, data: &[u8]) -> Result<T> {
    let text = utf8_text(data, path)?;
    serde_json::from_str(text).map_err(|e| Error::InvalidContainer(format!("{path}: {e}")))
}

/// `(<id>, document)` for every `<dir>/<id>/<file>` entry.
fn documents<'e, T: DeserializeOwned>(
    entries: &'e BTreeMap<String, Vec<u8>>,
    dir: &str,
    file: &str,
    warnings: &mut Vec<String>,
) -> Vec<(&'e str, T)> {
    entries
        .iter()
        .filter_map(|(path, data)| {
            let rest = path.strip_prefix(dir)?.strip_prefix('/')?;
            let (id, name) = rest.split_once('/')?;
            (name == file && !id.is_empty()).then_some((id, path, data))
        })
        .filter_map(|(id, path, data)| match parse_document(path, data) {
            Ok(doc) => Some((id, doc)),
            Err(e) => {
                warnings.push(format!("skipped unreadable document: {e}"));
                None
            }
        })
        .collect()
}

/// Character id for an export: the id the card came with, or one derived
/// from the card id.
fn character_id(data: &CardData, card_id: &str) -> Uuid {
    data.extensions
        .get(EXTENSION_KEY)
        .and_then(|v| v.get("id"))
        .and_then(Value::as_str)
        .and_then(|id| Uuid::parse_str(id).ok())
        .unwrap_or_else(|| Uuid::new_v5(&Uuid::NAMESPACE_OID, card_id.as_bytes()))
}

/// Book id recorded by a previous import, if any.
fn existing_book_id(data: &CardData) -> Option<String> {
    data.character_book
        .as_ref()?
        .extensions
        .get(EXTENSION_KEY)?
        .get("bookIds")?
        .get(0)?
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}

impl VoxtaHandler {
    fn decode_character(
        dir_id: &str,
        character: &VoxtaCharacter,
        books: &BTreeMap<&str, VoxtaBook>,
        entries: &BTreeMap<String, Vec<u8>>,
        warnings: &mut Vec<String>,
    ) -> DecodedCard {
        let linked: Vec<&VoxtaBook> = character
            .memory_books
            .iter()
            .filter_map(|id| {
                let book = books.get(id.as_str());
                if book.is_none() {
                    warnings.push(format!(
                        "character '{}' links missing memory book {id}",
                        character.name
                    ));
                }
                book
            })
            .collect();
        let record = voxta::to_canonical(character, &linked);

        let prefix = format!("{CHARACTERS_DIR}/{dir_id}/");
        let mut card_entries = BTreeMap::new();
        let mut descriptors = Vec::new();
        for (path, data) in entries.range(prefix.clone()..) {
            let Some(rel) = path.strip_prefix(&prefix) else {
                break;
            };
            let Some(asset) = voxta::classify_character_path(rel) else {
                continue;
            };
            let mut descriptor = AssetDescriptor::new(asset.kind, asset.name, asset.ext, path.clone());
            descriptor.tags = asset.tags;
            descriptor.is_main = asset.is_thumbnail;
            descriptor.order_index = descriptors.len();
            descriptors.push(descriptor);
            card_entries.insert(path.clone(), data.clone());
        }
        tracing::debug!(character = %character.name, assets = descriptors.len(), "decoded package character");

        DecodedCard {
            record,
            descriptors,
            chunks: None,
            entries: Some(card_entries),
            container_image: None,
        }
    }
}

impl FormatHandler for VoxtaHandler {
    fn format(&self) -> CardFormat {
        CardFormat::Voxta
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["voxpkg"]
    }

    fn detect(&self, data: &[u8], hints: &Hints<'_>) -> Confidence {
        let by_extension = hints.has_extension("voxpkg");
        if !is_zip(data) {
            return if by_extension {
                Confidence::Medium
            } else {
                Confidence::Unknown
            };
        }
        if by_extension {
            return Confidence::High;
        }
        match list_names(data) {
            Ok(names)
                if names
                    .iter()
                    .any(|n| n == PACKAGE_FILE || voxta::is_character_entry(n)) =>
            {
                Confidence::High
            }
            _ => Confidence::Unknown,
        }
    }

    fn rules(&self) -> RuleSet {
        RuleSet::VOXTA
    }

    fn decode(&self, data: &[u8], config: &PipelineConfig) -> Result<Decoded> {
        let mut archive = CardArchive::open(data, &config.zip_limits())?;
        let mut warnings: Vec<String> = preflight_warning(archive.preflight()).into_iter().collect();
        let entries = archive.read_all()?;

        if let Some(bytes) = entries.get(PACKAGE_FILE) {
            match parse_document::<VoxtaPackage>(PACKAGE_FILE, bytes) {
                Ok(package) => tracing::debug!(name = %package.name, version = ?package.version, "package manifest"),
                Err(e) => warnings.push(format!("ignored unreadable package manifest: {e}")),
            }
        }

        let books: BTreeMap<&str, VoxtaBook> =
            documents(&entries, BOOKS_DIR, BOOK_FILE, &mut warnings)
                .into_iter()
                .collect();
        let scenarios: Vec<String> =
            documents::<VoxtaScenario>(&entries, SCENARIOS_DIR, SCENARIO_FILE, &mut warnings)
                .into_iter()
                .map(|(id, s)| if s.name.is_empty() { id.to_owned() } else { s.name })
                .collect();
        let characters: Vec<(&str, VoxtaCharacter)> =
            documents(&entries, CHARACTERS_DIR, voxta::CHARACTER_FILE, &mut warnings);

        let mut cards = Vec::new();
        for (dir_id, character) in &characters {
            if !voxta::is_character_type(&character.type_tag) {
                tracing::debug!(dir_id, type_tag = %character.type_tag, "skipping non-character document");
                continue;
            }
            cards.push(Self::decode_character(dir_id, character, &books, &entries, &mut warnings));
        }
        if cards.is_empty() {
            return Err(Error::InvalidContainer("package holds no characters".into()));
        }

        Ok(Decoded {
            cards,
            warnings,
            scenarios,
        })
    }

    fn encode(&self, bundle: &ExportBundle, _config: &PipelineConfig) -> Result<Encoded> {
        let data = bundle.record.data();
        let id = character_id(data, &bundle.card_id);
        let package_id = Uuid::new_v5(&id, b"package");
        let mut warnings = Vec::new();

        let mut character = voxta::from_canonical(data, &id.to_string());
        character.package_id = Some(package_id.to_string());

        let book = data.character_book.as_ref().map(|lorebook| {
            let book_id = existing_book_id(data)
                .unwrap_or_else(|| Uuid::new_v5(&id, b"book").to_string());
            let item_ns = Uuid::parse_str(&book_id).unwrap_or(id);
            let mut book = voxta::lorebook_to_book(
                lorebook,
                &book_id,
                &format!("{} Memory", data.name),
                |i| Uuid::new_v5(&item_ns, i.to_string().as_bytes()).to_string(),
            );
            book.package_id = Some(package_id.to_string());
            book
        });
        if let Some(book) = &book {
            character.memory_books = vec![book.id.clone()];
        }

        let char_dir = format!("{CHARACTERS_DIR}/{id}");
        let mut used = HashSet::new();
        let mut members: Vec<(String, &[u8])> = Vec::new();
        let mut has_thumbnail = false;
        for asset in &bundle.assets {
            let d = &asset.descriptor;
            let Some(bytes) = &asset.data else {
                warnings.push(format!("asset '{}' has no stored bytes; not packaged", d.name));
                continue;
            };
            let is_thumbnail = d.is_main && !has_thumbnail;
            has_thumbnail |= is_thumbnail;

            let ext = paths::safe_ext(&d.ext, &asset.mimetype);
            let name = paths::sanitize_segment(&d.name, "asset");
            let asset_kind = paths::sanitize_segment(&d.kind.to_lowercase(), "other");
            let rel = voxta::placement(&asset_kind, &name, &ext, is_thumbnail);
            let path = paths::unique_member(&mut used, format!("{char_dir}/{rel}"));
            members.push((path, bytes.as_slice()));
        }

        let package = VoxtaPackage {
            type_tag: "package".into(),
            id: package_id.to_string(),
            name: data.name.clone(),
            version: (!data.character_version.is_empty()).then(|| data.character_version.clone()),
            description: (!data.creator_notes.is_empty()).then(|| data.creator_notes.clone()),
            creator: (!data.creator.is_empty()).then(|| data.creator.clone()),
            entry_resource: Some(json!({ "Kind": RESOURCE_KIND_CHARACTER, "Id": id.to_string() })),
            thumbnail_resource: has_thumbnail
                .then(|| json!({ "Kind": RESOURCE_KIND_CHARACTER, "Id": id.to_string() })),
            ..VoxtaPackage::default()
        };

        let mut writer = ArchiveWriter::new();
        writer.add(PACKAGE_FILE, &serde_json::to_vec_pretty(&package)?)?;
        writer.add(
            &format!("{char_dir}/{}", voxta::CHARACTER_FILE),
            &serde_json::to_vec_pretty(&character)?,
        )?;
        for (path, bytes) in &members {
            writer.add(path, bytes)?;
        }
        if let Some(book) = &book {
            writer.add(
                &format!("{BOOKS_DIR}/{}/{BOOK_FILE}", book.id),
                &serde_json::to_vec_pretty(book)?,
            )?;
        }

        Ok(Encoded {
            buffer: writer.finish()?,
            warnings,
        })
    }
}
