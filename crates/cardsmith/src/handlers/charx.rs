//! CHARX archives: `card.json` plus asset members.
//!
//! ```text
//! card.json
//! icon/main.png
//! emotion/happy.webp
//! assets/other/x-risu-asset/... (older writers nest under assets/)
//! ```

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, HashSet};

use cardsmith_card::asset::EMBEDDED_SCHEME;
use cardsmith_card::{json, AssetDescriptor, AssetUri, CardData};
use serde_json::Value;
use cardsmith_common::mime;
use cardsmith_zip::{is_zip, list_names, ArchiveWriter, CardArchive};

use super::{preflight_warning, utf8_text};
use crate::config::PipelineConfig;
use crate::export::ExportBundle;
use crate::format::{CardFormat, Confidence, Hints};
use crate::handler::{Decoded, DecodedCard, Encoded, FormatHandler};
use crate::paths;
use crate::validate::RuleSet;
use crate::{Error, Result};

const CARD_FILE: &str = "card.json";

/// Handler for `.charx` archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharxHandler;

/// A descriptor for a media member the record does not mention.
///
/// Accepts `<type>/<name>.<ext>` and `assets/<type>/.../<name>.<ext>`.
fn orphan_descriptor(path: &str, data: &[u8]) -> Option<AssetDescriptor> {
    let rel = match path.split_once('/') {
        Some((head, rest)) if head.eq_ignore_ascii_case("assets") => rest,
        _ => path,
    };
    let (kind, file_path) = rel.split_once('/')?;
    let file = file_path.rsplit('/').next().unwrap_or(file_path);
    let (name, ext) = file.rsplit_once('.').unwrap_or((file, ""));
    if kind.is_empty() || name.is_empty() {
        return None;
    }

    let mimetype = mime::detect(data, ext);
    let is_media = ["image/", "audio/", "video/"]
        .iter()
        .any(|prefix| mimetype.starts_with(prefix));
    if !is_media {
        return None;
    }

    Some(AssetDescriptor::new(
        kind.to_lowercase(),
        name,
        ext.to_ascii_lowercase(),
        format!("{EMBEDDED_SCHEME}{path}"),
    ))
}

/// Rewrite `embeded://` references in every string of a record.
fn rewrite_record_refs(data: &CardData, moves: &HashMap<String, String>) -> Result<CardData> {
    fn walk(value: &mut Value, moves: &HashMap<String, String>) {
        match value {
            Value::String(text) => {
                let rewritten = match paths::rewrite_embedded_refs(text, moves) {
                    Cow::Owned(rewritten) => Some(rewritten),
                    Cow::Borrowed(_) => None,
                };
                if let Some(rewritten) = rewritten {
                    *text = rewritten;
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|v| walk(v, moves)),
            Value::Object(map) => map.values_mut().for_each(|v| walk(v, moves)),
            _ => {}
        }
    }

    let mut value = serde_json::to_value(data)?;
    walk(&mut value, moves);
    Ok(serde_json::from_value(value)?)
}

impl FormatHandler for CharxHandler {
    fn format(&self) -> CardFormat {
        CardFormat::Charx
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["charx"]
    }

    fn detect(&self, data: &[u8], hints: &Hints<'_>) -> Confidence {
        let by_extension = hints.has_extension("charx");
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
            Ok(names) if names.iter().any(|n| n == CARD_FILE) => Confidence::High,
            _ => Confidence::Medium,
        }
    }

    fn rules(&self) -> RuleSet {
        RuleSet::CHARX
    }

    fn decode(&self, data: &[u8], config: &PipelineConfig) -> Result<Decoded> {
        let mut archive = CardArchive::open(data, &config.zip_limits())?;
        let warnings: Vec<String> = preflight_warning(archive.preflight()).into_iter().collect();
        if !archive.contains(CARD_FILE) {
            return Err(Error::InvalidContainer(format!("archive has no {CARD_FILE}")));
        }

        let entries = archive.read_all()?;
        let card_bytes = entries
            .get(CARD_FILE)
            .ok_or_else(|| Error::InvalidContainer(format!("{CARD_FILE} could not be read")))?;
        let record = json::parse_card(utf8_text(card_bytes, CARD_FILE)?)?;

        let mut card = DecodedCard::from_record(record);
        let referenced: BTreeSet<String> = card
            .descriptors
            .iter()
            .filter_map(|d| match d.parsed_uri() {
                AssetUri::Embedded(path) | AssetUri::Other(path) => Some(path.to_lowercase()),
                _ => None,
            })
            .collect();
        for (path, bytes) in &entries {
            if path == CARD_FILE || referenced.contains(&path.to_lowercase()) {
                continue;
            }
            if let Some(mut descriptor) = orphan_descriptor(path, bytes) {
                tracing::debug!(%path, kind = %descriptor.kind, "adopting unreferenced archive member");
                descriptor.order_index = card.descriptors.len();
                card.descriptors.push(descriptor);
            }
        }
        card.entries = Some(entries);

        Ok(Decoded {
            cards: vec![card],
            warnings,
            scenarios: Vec::new(),
        })
    }

    fn encode(&self, bundle: &ExportBundle, _config: &PipelineConfig) -> Result<Encoded> {
        let mut used = HashSet::from([CARD_FILE.to_owned()]);
        let mut members: Vec<(String, &[u8])> = Vec::new();
        let mut descriptors = Vec::with_capacity(bundle.assets.len());
        let mut moves: HashMap<String, String> = HashMap::new();

        for asset in &bundle.assets {
            let mut d = asset.descriptor.clone();
            if let Some(data) = &asset.data {
                let ext = paths::safe_ext(&d.ext, &asset.mimetype);
                let path = paths::unique_member(
                    &mut used,
                    paths::charx_member(&d.kind, &d.name, &ext, d.is_main),
                );
                if let AssetUri::Embedded(old) = d.parsed_uri() {
                    if old != path {
                        moves.insert(old.to_owned(), path.clone());
                    }
                }
                d.uri = format!("{EMBEDDED_SCHEME}{path}");
                d.ext = ext;
                members.push((path, data));
            }
            descriptors.push(d);
        }

        let mut record = bundle.record.clone().into_v3();
        record.data_mut().assets.clear();
        if !moves.is_empty() {
            tracing::debug!(moved = moves.len(), "rewriting embedded references");
            let rewritten = rewrite_record_refs(record.data(), &moves)?;
            *record.data_mut() = rewritten;
        }
        record.data_mut().assets = descriptors;

        let mut writer = ArchiveWriter::new();
        writer.add(CARD_FILE, record.to_json_pretty()?.as_bytes())?;
        for (path, data) in &members {
            writer.add(path, data)?;
        }

        Ok(Encoded {
            buffer: writer.finish()?,
            warnings: Vec::new(),
        })
    }
}
