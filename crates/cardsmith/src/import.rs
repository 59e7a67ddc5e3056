//! The import pipeline.
//!
//! decode -> schema check -> resolve assets -> main icon -> tags -> persist.
//!
//! Decoding and schema problems produce an unsuccessful [`ImportResult`]
//! carrying the accumulated warnings; repository and storage errors
//! propagate. Assets that cannot be resolved never fail an import.

use cardsmith_card::CardRecord;
use cardsmith_common::hash;

use crate::handler::{DecodedCard, FormatHandler, ImportContext, ImportResult};
use crate::main_icon::{select_main_icon, MainIconSelection};
use crate::paths;
use crate::repository::{CardAssetLink, NewAsset};
use crate::resolve::{resolve_all, Resolution};
use crate::tags::derive_tags;
use crate::{Error, Result};

/// A decoded card after resolution and main-icon selection.
#[derive(Debug, Clone)]
pub struct PreparedCard {
    /// The record, with its asset list cleared; assets live in `assets`.
    pub record: CardRecord,
    pub assets: Vec<Resolution>,
    pub main_icon: MainIconSelection,
    pub warnings: Vec<String>,
}

impl PreparedCard {
    pub fn resolved_count(&self) -> usize {
        self.assets.iter().filter(|r| r.is_resolved()).count()
    }
}

/// Resolve a decoded card's assets, pick its main icon and derive tags.
pub fn prepare(card: DecodedCard) -> PreparedCard {
    let mut assets = resolve_all(&card.descriptors, &card.sources());
    let mut warnings: Vec<String> = assets.iter().filter_map(Resolution::warning).collect();

    let main_icon = select_main_icon(&mut assets, card.container_image.as_deref());
    if let Some(warning) = &main_icon.warning {
        warnings.push(warning.clone());
    }

    for (i, resolution) in assets.iter_mut().enumerate() {
        let tags = {
            let bytes = resolution.as_resolved().map(|a| a.buffer.as_slice());
            derive_tags(resolution.descriptor(), bytes)
        };
        let d = resolution.descriptor_mut();
        d.tags = tags;
        d.order_index = i;
        if d.name.trim().is_empty() {
            let prefix = if d.kind.is_empty() { "asset" } else { d.kind.as_str() };
            d.name = format!("{prefix}_{}", i + 1);
        }
    }

    let mut record = card.record;
    record.data_mut().assets.clear();

    PreparedCard {
        record,
        assets,
        main_icon,
        warnings,
    }
}

/// Persist a prepared card. Returns the card id and the number of stored assets.
fn persist(card: PreparedCard, ctx: &ImportContext<'_>) -> Result<(String, usize)> {
    let card_id = ctx.repository.create_card(&card.record)?;
    let mut stored_count = 0;
    let mut main_asset = None;

    for resolution in card.assets {
        let (asset_id, descriptor) = match resolution {
            Resolution::Resolved(asset) => {
                let ext = paths::safe_ext(&asset.descriptor.ext, &asset.mimetype);
                let storage_url = ctx.storage.put(&asset.buffer, &ext)?;
                let stored = ctx.repository.create_asset(NewAsset {
                    storage_url,
                    mimetype: asset.mimetype,
                    size: asset.buffer.len() as u64,
                    content_hash: hash::sha256_hex(&asset.buffer),
                    width: asset.width,
                    height: asset.height,
                })?;
                if asset.descriptor.is_main {
                    main_asset = Some(stored.id.clone());
                }
                stored_count += 1;
                (Some(stored.id), asset.descriptor)
            }
            Resolution::Remote(descriptor) | Resolution::Unresolved { descriptor, .. } => {
                (None, descriptor)
            }
        };
        ctx.repository.create_card_asset_link(CardAssetLink {
            card_id: card_id.clone(),
            asset_id,
            descriptor,
        })?;
    }

    if let Some(asset_id) = main_asset {
        ctx.repository.set_main_asset(&card_id, &asset_id)?;
    }
    Ok((card_id, stored_count))
}

/// Run the import pipeline with one handler.
#[tracing::instrument(skip_all, fields(format = %handler.format(), size = ctx.data.len()))]
pub fn run<H: FormatHandler + ?Sized>(handler: &H, ctx: &ImportContext<'_>) -> Result<ImportResult> {
    let format = handler.format();
    let failure = |error: String, warnings: Vec<String>| ImportResult {
        format: Some(format),
        ..ImportResult::failure(error, warnings)
    };

    if !handler.can_import() {
        let err = Error::UnsupportedOperation {
            format,
            operation: "import",
        };
        return Ok(failure(err.to_string(), Vec::new()));
    }

    let decoded = match handler.decode(ctx.data, ctx.config) {
        Ok(decoded) => decoded,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "decode failed");
            return Ok(failure(e.to_string(), Vec::new()));
        }
    };
    let mut warnings = decoded.warnings;
    if decoded.cards.is_empty() {
        return Ok(failure("container holds no cards".into(), warnings));
    }

    let problems: Vec<String> = decoded
        .cards
        .iter()
        .flat_map(|card| ctx.schema.validate(&card.record))
        .collect();
    if !problems.is_empty() {
        return Ok(failure(Error::Schema(problems).to_string(), warnings));
    }

    if !decoded.scenarios.is_empty() {
        tracing::info!(scenarios = ?decoded.scenarios, "container carries scenarios; skipping them");
    }
    let mut result = ImportResult {
        success: true,
        format: Some(format),
        scenarios: decoded.scenarios,
        ..ImportResult::default()
    };
    for card in decoded.cards {
        let prepared = prepare(card);
        tracing::debug!(
            card = prepared.record.name(),
            assets = prepared.assets.len(),
            resolved = prepared.resolved_count(),
            main = ?prepared.main_icon.step,
            "prepared card"
        );
        warnings.extend(prepared.warnings.iter().cloned());
        let (card_id, stored) = persist(prepared, ctx)?;
        result.card_ids.push(card_id);
        result.assets_imported += stored;
    }
    result.warnings = warnings;

    tracing::info!(
        cards = result.card_ids.len(),
        assets = result.assets_imported,
        warnings = result.warnings.len(),
        "imported"
    );
    Ok(result)
}
