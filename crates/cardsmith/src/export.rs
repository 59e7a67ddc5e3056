//! The export pipeline.
//!
//! load card and links -> validate (with fixes) -> optimize media ->
//! deterministic sort -> encode. Expected failures come back as an
//! unsuccessful [`ExportResult`]; repository and storage errors propagate.

use cardsmith_card::{AssetDescriptor, CardRecord};
use cardsmith_common::mime;

use crate::handler::{ExportContext, ExportResult, FormatHandler};
use crate::media::MediaOptimizer;
use crate::paths;
use crate::repository::{AssetStorage, CardRepository};
use crate::validate;
use crate::{Error, Result};

/// One asset of an export, with its bytes when they are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleAsset {
    pub descriptor: AssetDescriptor,
    pub storage_url: Option<String>,
    pub content_hash: Option<String>,
    pub mimetype: String,
    /// `None` for remote and unresolved descriptors, and for stored assets
    /// whose blob is gone.
    pub data: Option<Vec<u8>>,
}

/// A card ready for encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportBundle {
    pub card_id: String,
    pub record: CardRecord,
    pub assets: Vec<BundleAsset>,
}

impl ExportBundle {
    /// Load a card and its assets. Returns `None` when the card does not exist.
    pub fn load(
        repository: &dyn CardRepository,
        storage: &dyn AssetStorage,
        card_id: &str,
    ) -> Result<Option<Self>> {
        let Some(card) = repository.get_card(card_id)? else {
            return Ok(None);
        };

        let mut assets = Vec::new();
        for link in repository.list_assets_for_card(card_id)? {
            let asset = match link.asset {
                Some(stored) => {
                    let data = if storage.exists(&stored.storage_url)? {
                        Some(storage.get(&stored.storage_url)?)
                    } else {
                        tracing::warn!(url = %stored.storage_url, "stored asset is missing");
                        None
                    };
                    BundleAsset {
                        descriptor: link.descriptor,
                        storage_url: Some(stored.storage_url),
                        content_hash: Some(stored.content_hash),
                        mimetype: stored.mimetype,
                        data,
                    }
                }
                None => BundleAsset {
                    mimetype: mime::from_extension(&link.descriptor.ext).to_owned(),
                    descriptor: link.descriptor,
                    storage_url: None,
                    content_hash: None,
                    data: None,
                },
            };
            assets.push(asset);
        }

        Ok(Some(Self {
            card_id: card.id,
            record: card.record,
            assets,
        }))
    }

    /// The stored main icon, if any.
    pub fn main_icon(&self) -> Option<&BundleAsset> {
        self.assets
            .iter()
            .find(|a| a.descriptor.is_main && a.data.is_some())
    }

    /// Order assets by `(type, order_index, name)`.
    pub fn sort(&mut self) {
        self.assets.sort_by(|a, b| {
            let (a, b) = (&a.descriptor, &b.descriptor);
            (&a.kind, a.order_index, &a.name).cmp(&(&b.kind, b.order_index, &b.name))
        });
    }

    /// Run every stored asset through `optimizer`.
    pub fn optimize(&mut self, optimizer: &dyn MediaOptimizer) -> Result<()> {
        for asset in &mut self.assets {
            if let Some(data) = asset.data.take() {
                let ext = paths::safe_ext(&asset.descriptor.ext, &asset.mimetype);
                asset.data = Some(optimizer.optimize(data, &asset.mimetype, &ext)?);
            }
        }
        Ok(())
    }
}

/// Validate a stored card against a handler's rules without encoding it.
///
/// Returns `None` when the card does not exist.
pub fn check<H: FormatHandler + ?Sized>(
    handler: &H,
    ctx: &ExportContext<'_>,
) -> Result<Option<validate::ValidationReport>> {
    let Some(mut bundle) = ExportBundle::load(ctx.repository, ctx.storage, ctx.card_id)? else {
        return Ok(None);
    };
    Ok(Some(validate::validate(&mut bundle, &handler.rules())))
}

/// Run the export pipeline for one card.
#[tracing::instrument(skip_all, fields(format = %handler.format(), card = ctx.card_id))]
pub fn run<H: FormatHandler + ?Sized>(handler: &H, ctx: &ExportContext<'_>) -> Result<ExportResult> {
    let format = handler.format();
    if !handler.can_export() {
        let err = Error::UnsupportedOperation {
            format,
            operation: "export",
        };
        return Ok(ExportResult::failure(err.to_string(), Vec::new()));
    }

    let Some(mut bundle) = ExportBundle::load(ctx.repository, ctx.storage, ctx.card_id)? else {
        return Ok(ExportResult::failure(
            Error::NotFound(format!("card {}", ctx.card_id)).to_string(),
            Vec::new(),
        ));
    };

    let report = validate::validate(&mut bundle, &handler.rules());
    let mut warnings = report.warnings.clone();
    warnings.extend(report.fixes.iter().map(|fix| format!("fixed: {fix}")));
    if !report.valid {
        tracing::warn!(errors = report.errors.len(), "export blocked by validation");
        let err = Error::ExportValidation(Box::new(report.clone()));
        return Ok(ExportResult {
            validation: Some(report),
            ..ExportResult::failure(err.to_string(), warnings)
        });
    }

    let encoded = bundle
        .optimize(ctx.optimizer)
        .and_then(|()| {
            bundle.sort();
            handler.encode(&bundle, ctx.config)
        });
    let encoded = match encoded {
        Ok(encoded) => encoded,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "encode failed");
            return Ok(ExportResult {
                validation: Some(report),
                ..ExportResult::failure(e.to_string(), warnings)
            });
        }
    };
    warnings.extend(encoded.warnings);

    tracing::info!(
        size = encoded.buffer.len(),
        assets = bundle.assets.len(),
        warnings = warnings.len(),
        "exported card"
    );

    Ok(ExportResult {
        success: true,
        buffer: encoded.buffer,
        mimetype: format.mimetype().to_owned(),
        filename: paths::card_filename(bundle.record.name(), format.extension()),
        warnings,
        error: None,
        validation: Some(report),
    })
}
