//! PNG cards: the record rides in a text chunk of a portrait image.

use cardsmith_card::asset::{decode_base64, encode_base64, DEFAULT_SCHEME};
use cardsmith_card::json;
use cardsmith_png::{embed_text_chunks, has_card_chunk, is_png, CardPng, TextChunk};

use crate::config::PipelineConfig;
use crate::export::ExportBundle;
use crate::format::{CardFormat, Confidence, Hints};
use crate::handler::{Decoded, DecodedCard, Encoded, FormatHandler};
use crate::media;
use crate::resolve::SIDE_CHUNK_PREFIX;
use crate::validate::RuleSet;
use crate::{Error, Result};

/// Keyword of the chunk written on export.
const CARD_KEYWORD: &str = "chara";
/// URI prefix pointing side assets at their chunk.
const SIDE_ASSET_URI: &str = "__asset:";

/// Handler for PNG character cards.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngHandler;

/// Card chunk text is base64 JSON; some writers store the JSON directly.
fn card_json(text: &str) -> Result<String> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed.to_owned());
    }
    let bytes = decode_base64(text)?;
    String::from_utf8(bytes)
        .map_err(|e| Error::InvalidContainer(format!("card chunk is not UTF-8: {e}")))
}

impl PngHandler {
    /// The carrier image for an export and any warning about how it was made.
    fn carrier(bundle: &ExportBundle, config: &PipelineConfig) -> Result<(Vec<u8>, Option<String>)> {
        let placeholder = || {
            media::placeholder_png(
                bundle.record.name(),
                config.placeholder_width,
                config.placeholder_height,
            )
        };

        let Some(data) = bundle.main_icon().and_then(|a| a.data.as_deref()) else {
            return Ok((
                placeholder()?,
                Some("card has no main icon; wrote a placeholder image".into()),
            ));
        };
        if is_png(data) {
            return Ok((data.to_vec(), None));
        }
        match media::transcode_to_png(data) {
            Ok(png) => Ok((png, None)),
            Err(e) => Ok((
                placeholder()?,
                Some(format!("main icon could not be converted to PNG ({e}); wrote a placeholder image")),
            )),
        }
    }
}

impl FormatHandler for PngHandler {
    fn format(&self) -> CardFormat {
        CardFormat::Png
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["png"]
    }

    fn detect(&self, data: &[u8], _hints: &Hints<'_>) -> Confidence {
        if !is_png(data) {
            return Confidence::Unknown;
        }
        if has_card_chunk(data) {
            Confidence::High
        } else {
            Confidence::Low
        }
    }

    fn rules(&self) -> RuleSet {
        RuleSet::PNG
    }

    fn decode(&self, data: &[u8], config: &PipelineConfig) -> Result<Decoded> {
        let mut png = CardPng::parse(data, &config.size_gate())?;

        let mut warnings = Vec::new();
        if png.is_oversized() {
            warnings.push(format!(
                "PNG is {} bytes, above the warning threshold",
                data.len()
            ));
        }

        let text = png
            .card_text()
            .ok_or_else(|| Error::InvalidContainer("PNG has no character card chunk".into()))?;
        tracing::debug!(keyword = ?png.card_keyword(), size = text.len(), "found card chunk");
        let record = json::parse_card(&card_json(text)?)?;

        let chunks = png.take_extra_chunks();
        let image = png.into_stripped_image();
        let card = DecodedCard {
            chunks: Some(chunks),
            container_image: Some(image),
            ..DecodedCard::from_record(record)
        };

        Ok(Decoded {
            cards: vec![card],
            warnings,
            scenarios: Vec::new(),
        })
    }

    fn encode(&self, bundle: &ExportBundle, config: &PipelineConfig) -> Result<Encoded> {
        let (carrier, warning) = Self::carrier(bundle, config)?;
        let main = bundle.main_icon();

        let mut side_chunks = Vec::new();
        let mut descriptors = Vec::with_capacity(bundle.assets.len());
        for asset in &bundle.assets {
            let mut d = asset.descriptor.clone();
            if main.is_some_and(|m| std::ptr::eq(m, asset)) {
                d.uri = DEFAULT_SCHEME.into();
                d.ext = "png".into();
            } else if let Some(data) = &asset.data {
                let n = side_chunks.len();
                side_chunks.push(TextChunk::new(
                    format!("{SIDE_CHUNK_PREFIX}{n}"),
                    encode_base64(data),
                ));
                d.uri = format!("{SIDE_ASSET_URI}{n}");
            }
            descriptors.push(d);
        }

        let mut record = bundle.record.clone();
        if !descriptors.is_empty() {
            record = record.into_v3();
        }
        record.data_mut().assets = descriptors;

        let mut texts = Vec::with_capacity(side_chunks.len() + 1);
        texts.push(TextChunk::new(
            CARD_KEYWORD,
            encode_base64(record.to_json()?.as_bytes()),
        ));
        texts.extend(side_chunks);

        Ok(Encoded {
            buffer: embed_text_chunks(&carrier, &texts)?,
            warnings: warning.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use cardsmith_card::{AssetDescriptor, CardData, CardRecord};

    use super::*;
    use crate::handlers::fixtures::{self, Env};
    use crate::repository::CardRepository;

    fn card_png(record: &CardRecord, extra: &[TextChunk]) -> Vec<u8> {
        let mut texts = vec![TextChunk::new(
            "chara",
            encode_base64(record.to_json().unwrap().as_bytes()),
        )];
        texts.extend_from_slice(extra);
        embed_text_chunks(&fixtures::png(4, 6, [200, 100, 50]), &texts).unwrap()
    }

    #[test]
    fn test_detect() {
        let plain = fixtures::png(1, 1, [0, 0, 0]);
        let card = card_png(&CardRecord::V2(CardData::named("Ava")), &[]);
        let hints = Hints::new(Some("a.png"), Some("image/png"));
        assert_eq!(PngHandler.detect(&card, &hints), Confidence::High);
        assert_eq!(PngHandler.detect(&plain, &hints), Confidence::Low);
        assert_eq!(PngHandler.detect(b"{}", &hints), Confidence::Unknown);
    }

    #[test]
    fn test_plain_json_chunk_is_tolerated() {
        let png = embed_text_chunks(
            &fixtures::png(1, 1, [0, 0, 0]),
            &[TextChunk::new("chara", r#"{"name":"Ava"}"#)],
        )
        .unwrap();
        let decoded = PngHandler.decode(&png, &PipelineConfig::default()).unwrap();
        assert_eq!(decoded.cards[0].record.name(), "Ava");
    }

    #[test]
    fn test_container_image_becomes_main_icon() {
        let png = card_png(&CardRecord::V2(CardData::named("Ava")), &[]);
        let env = Env::default();
        let result = PngHandler.import(&env.import(&png, Some("ava.png"))).unwrap();
        assert!(result.success);
        assert_eq!(result.assets_imported, 1);
        assert!(result.warnings.iter().any(|w| w.contains("container image")));

        let id = &result.card_ids[0];
        assert!(env.repository.get_card(id).unwrap().unwrap().main_asset_id.is_some());
        let links = env.repository.list_assets_for_card(id).unwrap();
        assert_eq!(links[0].descriptor.name, "main");
        assert!(links[0].descriptor.has_tag("portrait-override"));
    }

    #[test]
    fn test_side_chunk_assets_resolve() {
        let mut data = CardData::named("Ava");
        data.assets = vec![
            AssetDescriptor::new("icon", "main", "png", "ccdefault:"),
            AssetDescriptor::new("emotion", "happy", "png", "chara-ext-asset_:7"),
        ];
        let happy = fixtures::png(2, 2, [0, 255, 0]);
        let png = card_png(
            &CardRecord::V3(data),
            &[TextChunk::new("chara-ext-asset_7", encode_base64(&happy))],
        );

        let env = Env::default();
        let result = PngHandler.import(&env.import(&png, None)).unwrap();
        assert!(result.success);
        assert_eq!(result.assets_imported, 2);

        let links = env.repository.list_assets_for_card(&result.card_ids[0]).unwrap();
        assert_eq!(links.len(), 2);
        let happy_link = links.iter().find(|l| l.descriptor.name == "happy").unwrap();
        assert_eq!(happy_link.asset.as_ref().unwrap().width, Some(2));
        let main = links.iter().find(|l| l.descriptor.is_main).unwrap();
        assert_eq!(main.descriptor.name, "main");
    }

    #[test]
    fn test_roundtrip() {
        let mut data = CardData::named("Ava");
        data.first_mes = "Hello.".into();
        data.assets = vec![
            AssetDescriptor::new("icon", "main", "png", "ccdefault:"),
            AssetDescriptor::new("emotion", "happy", "png", "__asset:0"),
        ];
        let happy = fixtures::png(2, 2, [0, 255, 0]);
        let png = card_png(
            &CardRecord::V3(data),
            &[TextChunk::new("chara-ext-asset_0", encode_base64(&happy))],
        );

        let env = Env::default();
        let first = PngHandler.import(&env.import(&png, None)).unwrap();
        let exported = PngHandler.export(&env.export(&first.card_ids[0])).unwrap();
        assert!(exported.success, "{:?}", exported.error);
        assert_eq!(exported.mimetype, "image/png");

        let second = PngHandler.import(&env.import(&exported.buffer, None)).unwrap();
        assert!(second.success);
        assert_eq!(second.assets_imported, 2);

        let a = env.repository.get_card(&first.card_ids[0]).unwrap().unwrap();
        let b = env.repository.get_card(&second.card_ids[0]).unwrap().unwrap();
        assert_eq!(a.record.data().first_mes, b.record.data().first_mes);
        assert_eq!(a.record.name(), b.record.name());

        let happy_again = env
            .repository
            .list_assets_for_card(&second.card_ids[0])
            .unwrap()
            .into_iter()
            .find(|l| l.descriptor.name == "happy")
            .and_then(|l| l.asset)
            .unwrap();
        assert_eq!(happy_again.content_hash, cardsmith_common::hash::sha256_hex(&happy));
    }

    #[test]
    fn test_export_without_icon_uses_placeholder() {
        let env = Env::default();
        let id = env
            .repository
            .create_card(&CardRecord::V2(CardData::named("Ava")))
            .unwrap();

        let exported = PngHandler.export(&env.export(&id)).unwrap();
        assert!(exported.success);
        assert!(exported.warnings.iter().any(|w| w.contains("placeholder")));

        let img = image::load_from_memory(&exported.buffer).unwrap();
        assert_eq!((img.width(), img.height()), (400, 600));
        assert!(has_card_chunk(&exported.buffer));
    }

    #[test]
    fn test_oversized_png_is_rejected() {
        let png = card_png(&CardRecord::V2(CardData::named("Ava")), &[]);
        let mut env = Env::default();
        env.config.limits.png_warn_bytes = 8;
        env.config.limits.png_max_bytes = 16;
        let result = PngHandler.import(&env.import(&png, None)).unwrap();
        assert!(!result.success);
        assert!(env.repository.card_ids().is_empty());
    }
}
