//! Plain card JSON.

use cardsmith_card::asset::encode_data_uri;
use cardsmith_card::json;
use cardsmith_common::scan;
use serde::de::IgnoredAny;

use super::utf8_text;
use crate::config::PipelineConfig;
use crate::export::ExportBundle;
use crate::format::{CardFormat, Confidence, Hints};
use crate::handler::{Decoded, DecodedCard, Encoded, FormatHandler};
use crate::validate::RuleSet;
use crate::Result;

/// Byte patterns that make unparseable JSON worth a recovery attempt.
const RECOVERY_HINTS: [&[u8]; 2] = [b"chara_card_v", b"\"name\""];

/// Handler for `.json` cards and card collections.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHandler;

impl FormatHandler for JsonHandler {
    fn format(&self) -> CardFormat {
        CardFormat::Json
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn detect(&self, data: &[u8], hints: &Hints<'_>) -> Confidence {
        let body = scan::trim_start(data);
        if body.starts_with(b"{") || body.starts_with(b"[") {
            if serde_json::from_slice::<IgnoredAny>(body).is_ok() {
                return Confidence::Medium;
            }
            if body.starts_with(b"{")
                && RECOVERY_HINTS
                    .iter()
                    .any(|hint| scan::contains_pattern(hint, body))
            {
                return Confidence::Low;
            }
        }
        if hints.has_extension("json") || hints.mime().as_deref() == Some("application/json") {
            return Confidence::Medium;
        }
        Confidence::Unknown
    }

    fn rules(&self) -> RuleSet {
        RuleSet::JSON
    }

    fn decode(&self, data: &[u8], _config: &PipelineConfig) -> Result<Decoded> {
        let text = utf8_text(data, "card JSON")?;
        let parsed = json::parse_cards(text)?;

        let mut warnings = Vec::new();
        if parsed.recovered {
            warnings.push("card JSON is damaged; recovered a record from part of it".into());
        }
        if parsed.skipped > 0 {
            warnings.push(format!(
                "skipped {} collection element(s) that are not cards",
                parsed.skipped
            ));
        }
        tracing::debug!(
            cards = parsed.records.len(),
            collection = parsed.is_collection,
            "decoded card JSON"
        );

        Ok(Decoded {
            cards: parsed.records.into_iter().map(DecodedCard::from_record).collect(),
            warnings,
            scenarios: Vec::new(),
        })
    }

    fn encode(&self, bundle: &ExportBundle, config: &PipelineConfig) -> Result<Encoded> {
        let assets: Vec<_> = bundle
            .assets
            .iter()
            .map(|asset| {
                let mut d = asset.descriptor.clone();
                match (&asset.data, &asset.storage_url) {
                    (Some(data), _) if config.json_embed_assets => {
                        d.uri = encode_data_uri(&asset.mimetype, data);
                    }
                    (Some(_), Some(url)) => d.uri = url.clone(),
                    _ => {}
                }
                d
            })
            .collect();

        let mut record = bundle.record.clone();
        if !assets.is_empty() {
            record = record.into_v3();
        }
        record.data_mut().assets = assets;

        Ok(Encoded {
            buffer: record.to_json_pretty()?.into_bytes(),
            warnings: Vec::new(),
        })
    }
}
