//! Handler registry and format detection.

use crate::export;
use crate::format::{CardFormat, Confidence, DetectionResult, Hints};
use crate::handler::{ExportContext, ExportResult, FormatHandler, ImportContext, ImportResult};
use crate::handlers::{CharxHandler, JsonHandler, PngHandler, VoxtaHandler};
use crate::validate::ValidationReport;
use crate::{Error, Result};

/// An ordered set of format handlers.
///
/// Detection asks every handler in registration order and keeps the highest
/// confidence; ties go to the handler registered first.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn FormatHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handlers: Voxta, CHARX, PNG, JSON.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(VoxtaHandler);
        registry.register(CharxHandler);
        registry.register(PngHandler);
        registry.register(JsonHandler);
        registry
    }

    /// Add a handler. A handler for an already registered format replaces it
    /// in place.
    pub fn register(&mut self, handler: impl FormatHandler + 'static) {
        let handler: Box<dyn FormatHandler> = Box::new(handler);
        match self
            .handlers
            .iter_mut()
            .find(|h| h.format() == handler.format())
        {
            Some(slot) => *slot = handler,
            None => self.handlers.push(handler),
        }
    }

    /// Registered formats in registration order.
    pub fn formats(&self) -> Vec<CardFormat> {
        self.handlers.iter().map(|h| h.format()).collect()
    }

    pub fn get(&self, format: CardFormat) -> Option<&dyn FormatHandler> {
        self.handlers
            .iter()
            .find(|h| h.format() == format)
            .map(|h| h.as_ref())
    }

    /// The handler claiming a file extension. Case-insensitive; a leading
    /// dot is ignored.
    pub fn find_by_extension(&self, ext: &str) -> Option<&dyn FormatHandler> {
        let ext = ext.strip_prefix('.').unwrap_or(ext).to_ascii_lowercase();
        self.handlers
            .iter()
            .find(|h| h.extensions().contains(&ext.as_str()))
            .map(|h| h.as_ref())
    }

    /// Every handler's score, in registration order.
    pub fn detect_all(&self, data: &[u8], hints: &Hints<'_>) -> Vec<DetectionResult> {
        self.handlers
            .iter()
            .map(|h| DetectionResult {
                format: h.format(),
                confidence: h.detect(data, hints),
            })
            .collect()
    }

    /// The best-scoring format, or `None` when no handler claims the input.
    pub fn detect(&self, data: &[u8], hints: &Hints<'_>) -> Option<DetectionResult> {
        let mut best: Option<DetectionResult> = None;
        for result in self.detect_all(data, hints) {
            if !result.confidence.is_known() {
                continue;
            }
            if best.map_or(true, |b| result.confidence > b.confidence) {
                best = Some(result);
            }
        }
        tracing::debug!(
            filename = hints.filename,
            detected = ?best.map(|b| b.format),
            confidence = ?best.map(|b| b.confidence),
            "format detection"
        );
        best
    }

    /// Detect the input format and import with its handler.
    pub fn import(&self, ctx: &ImportContext<'_>) -> Result<ImportResult> {
        let handler = self
            .detect(ctx.data, &ctx.hints())
            .and_then(|d| self.get(d.format));
        match handler {
            Some(handler) => handler.import(ctx),
            None => {
                tracing::warn!(filename = ctx.filename, "no handler claims the input");
                Ok(ImportResult::failure(
                    Error::UnsupportedFormat.to_string(),
                    Vec::new(),
                ))
            }
        }
    }

    /// Export a stored card to `format`.
    pub fn export(&self, format: CardFormat, ctx: &ExportContext<'_>) -> Result<ExportResult> {
        match self.get(format) {
            Some(handler) => handler.export(ctx),
            None => Ok(ExportResult::failure(
                format!("no handler registered for {format}"),
                Vec::new(),
            )),
        }
    }

    /// Run `format`'s export validation on a stored card without encoding.
    pub fn check(&self, format: CardFormat, ctx: &ExportContext<'_>) -> Result<Option<ValidationReport>> {
        let handler = self
            .get(format)
            .ok_or_else(|| Error::Config(format!("no handler registered for {format}")))?;
        export::check(handler, ctx)
    }
}

#[cfg(test)]
mod tests {
    use cardsmith_card::{CardData, CardRecord};

    use super::*;
    use crate::handlers::fixtures::{self, Env};

    #[test]
    fn test_default_order() {
        let registry = HandlerRegistry::with_defaults();
        assert_eq!(
            registry.formats(),
            vec![CardFormat::Voxta, CardFormat::Charx, CardFormat::Png, CardFormat::Json]
        );
    }

    #[test]
    fn test_find_by_extension() {
        let registry = HandlerRegistry::with_defaults();
        assert_eq!(registry.find_by_extension(".CHARX").unwrap().format(), CardFormat::Charx);
        assert_eq!(registry.find_by_extension("voxpkg").unwrap().format(), CardFormat::Voxta);
        assert!(registry.find_by_extension("gif").is_none());
    }

    #[test]
    fn test_detection_picks_highest() {
        let registry = HandlerRegistry::with_defaults();
        let none = Hints::default();

        let card = fixtures::zip(&[("card.json", b"{}".as_slice())]);
        let detected = registry.detect(&card, &none).unwrap();
        assert_eq!(detected.format, CardFormat::Charx);
        assert_eq!(detected.confidence, Confidence::High);

        let package = fixtures::zip(&[("Characters/a/character.json", b"{}".as_slice())]);
        assert_eq!(registry.detect(&package, &none).unwrap().format, CardFormat::Voxta);

        let generic = fixtures::zip(&[("readme.txt", b"hi".as_slice())]);
        let detected = registry.detect(&generic, &none).unwrap();
        assert_eq!((detected.format, detected.confidence), (CardFormat::Charx, Confidence::Medium));

        let json = registry.detect(br#"{"name":"Ava"}"#, &none).unwrap();
        assert_eq!(json.format, CardFormat::Json);

        assert!(registry.detect(b"GIF89a", &none).is_none());
    }

    #[test]
    fn test_detection_is_deterministic() {
        let registry = HandlerRegistry::with_defaults();
        let hints = Hints::new(Some("thing.voxpkg"), None);
        let data = fixtures::zip(&[("card.json", b"{}".as_slice())]);

        // Both zip handlers score High; the first registered wins.
        let first = registry.detect(&data, &hints).unwrap();
        assert_eq!(first.format, CardFormat::Voxta);
        for _ in 0..5 {
            assert_eq!(registry.detect(&data, &hints), Some(first));
        }
    }

    #[test]
    fn test_register_replaces_same_format() {
        let mut registry = HandlerRegistry::with_defaults();
        registry.register(JsonHandler);
        assert_eq!(registry.formats().len(), 4);
        assert_eq!(*registry.formats().last().unwrap(), CardFormat::Json);
    }

    #[test]
    fn test_import_unsupported_input() {
        let env = Env::default();
        let result = HandlerRegistry::with_defaults()
            .import(&env.import(b"\x00\x01\x02", Some("blob.bin")))
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("unsupported format"));
    }

    #[test]
    fn test_import_then_export_and_check() {
        let registry = HandlerRegistry::with_defaults();
        let env = Env::default();
        let text = CardRecord::V2(CardData::named("Ava")).to_json().unwrap();

        let imported = registry.import(&env.import(text.as_bytes(), Some("ava.json"))).unwrap();
        assert!(imported.success);
        assert_eq!(imported.format, Some(CardFormat::Json));
        let id = &imported.card_ids[0];

        let png = registry.export(CardFormat::Png, &env.export(id)).unwrap();
        assert!(png.success);

        let report = registry.check(CardFormat::Charx, &env.export(id)).unwrap().unwrap();
        assert!(!report.valid);
        assert!(registry.check(CardFormat::Charx, &env.export("missing")).unwrap().is_none());
    }
}
