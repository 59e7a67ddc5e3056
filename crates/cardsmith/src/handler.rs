//! The format handler contract.
//!
//! A handler owns one container format: it scores inputs during detection,
//! decodes containers into canonical records plus byte sources, and encodes
//! a validated [`ExportBundle`] back into container bytes. The import and
//! export pipelines drive these methods; callers normally use
//! [`FormatHandler::import`] and [`FormatHandler::export`].

use std::collections::BTreeMap;

use cardsmith_card::{AssetDescriptor, CardRecord};
use cardsmith_png::TextChunk;

use crate::config::PipelineConfig;
use crate::export::ExportBundle;
use crate::format::{CardFormat, Confidence, Hints};
use crate::media::MediaOptimizer;
use crate::repository::{AssetStorage, CardRepository};
use crate::resolve::ByteSources;
use crate::schema::SchemaValidator;
use crate::validate::{RuleSet, ValidationReport};
use crate::Result;

/// One card decoded from a container, before asset resolution.
#[derive(Debug, Clone)]
pub struct DecodedCard {
    pub record: CardRecord,
    /// Asset descriptors to resolve, in source order.
    pub descriptors: Vec<AssetDescriptor>,
    /// PNG text chunks other than the card chunk.
    pub chunks: Option<Vec<TextChunk>>,
    /// Archive members this card may reference.
    pub entries: Option<BTreeMap<String, Vec<u8>>>,
    /// PNG container with text chunks stripped.
    pub container_image: Option<Vec<u8>>,
}

impl DecodedCard {
    /// A card whose descriptors are the record's own asset list.
    pub fn from_record(record: CardRecord) -> Self {
        let descriptors = record.assets().to_vec();
        Self {
            record,
            descriptors,
            chunks: None,
            entries: None,
            container_image: None,
        }
    }

    pub fn sources(&self) -> ByteSources<'_> {
        ByteSources {
            chunks: self.chunks.as_deref(),
            entries: self.entries.as_ref(),
        }
    }
}

/// Everything a container decoded into.
#[derive(Debug, Clone, Default)]
pub struct Decoded {
    pub cards: Vec<DecodedCard>,
    pub warnings: Vec<String>,
    /// Names of non-character documents carried alongside (package scenarios).
    pub scenarios: Vec<String>,
}

/// Encoded container bytes.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub buffer: Vec<u8>,
    pub warnings: Vec<String>,
}

/// Inputs to an import.
pub struct ImportContext<'a> {
    pub data: &'a [u8],
    pub filename: Option<&'a str>,
    pub mimetype: Option<&'a str>,
    pub repository: &'a dyn CardRepository,
    pub storage: &'a dyn AssetStorage,
    pub schema: &'a dyn SchemaValidator,
    pub config: &'a PipelineConfig,
}

impl ImportContext<'_> {
    pub fn hints(&self) -> Hints<'_> {
        Hints::new(self.filename, self.mimetype)
    }
}

/// Inputs to an export.
pub struct ExportContext<'a> {
    pub card_id: &'a str,
    pub repository: &'a dyn CardRepository,
    pub storage: &'a dyn AssetStorage,
    pub optimizer: &'a dyn MediaOptimizer,
    pub config: &'a PipelineConfig,
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportResult {
    pub success: bool,
    pub format: Option<CardFormat>,
    pub card_ids: Vec<String>,
    pub assets_imported: usize,
    /// Scenario documents seen in the container; they are not imported.
    pub scenarios: Vec<String>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl ImportResult {
    pub fn failure(error: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            warnings,
            ..Self::default()
        }
    }
}

/// Outcome of an export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportResult {
    pub success: bool,
    pub buffer: Vec<u8>,
    pub mimetype: String,
    pub filename: String,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    /// Validation outcome, when validation ran.
    pub validation: Option<ValidationReport>,
}

impl ExportResult {
    pub fn failure(error: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            warnings,
            ..Self::default()
        }
    }
}

/// A container format implementation.
pub trait FormatHandler: Send + Sync {
    fn format(&self) -> CardFormat;

    /// File extensions this handler claims, lower-case without dots.
    fn extensions(&self) -> &'static [&'static str];

    /// Score an input. Must be a pure function of its arguments.
    fn detect(&self, data: &[u8], hints: &Hints<'_>) -> Confidence;

    fn can_import(&self) -> bool {
        true
    }

    fn can_export(&self) -> bool {
        true
    }

    /// Export validation rules for this format.
    fn rules(&self) -> RuleSet;

    /// Decode container bytes.
    fn decode(&self, data: &[u8], config: &PipelineConfig) -> Result<Decoded>;

    /// Encode a validated, ordered bundle.
    fn encode(&self, bundle: &ExportBundle, config: &PipelineConfig) -> Result<Encoded>;

    /// Run the import pipeline with this handler.
    fn import(&self, ctx: &ImportContext<'_>) -> Result<ImportResult> {
        crate::import::run(self, ctx)
    }

    /// Run the export pipeline with this handler.
    fn export(&self, ctx: &ExportContext<'_>) -> Result<ExportResult> {
        crate::export::run(self, ctx)
    }
}
