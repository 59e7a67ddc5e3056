//! Cardsmith CLI - Command-line tool for converting character cards.
//!
//! This is the main entry point for the `cardsmith` command-line application.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use cardsmith::prelude::*;
use cardsmith::{ImportResult, ValidationReport};

/// Cardsmith - character card conversion tool
#[derive(Parser)]
#[command(name = "cardsmith")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Pipeline configuration file (JSON)
    #[arg(long, global = true, env = "CARDSMITH_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    limits: LimitArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Single-limit overrides applied on top of the configuration file.
#[derive(Args)]
struct LimitArgs {
    /// Reject PNG inputs larger than this many bytes
    #[arg(long, global = true)]
    png_max_bytes: Option<u64>,

    /// Reject archives whose entries expand past this many bytes in total
    #[arg(long, global = true)]
    zip_max_total_bytes: Option<u64>,

    /// Reject archives with more entries than this
    #[arg(long, global = true)]
    zip_max_entries: Option<u64>,

    /// Reject archives with a single entry larger than this many bytes
    #[arg(long, global = true)]
    zip_max_entry_bytes: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how each format handler scores a file
    Detect {
        /// Input file
        input: PathBuf,
    },

    /// Import a file and list its cards, assets and warnings
    Inspect {
        /// Input file
        input: PathBuf,
    },

    /// Convert a card file to another format
    Convert {
        /// Input file
        input: PathBuf,

        /// Target format (json, png, charx, voxta)
        #[arg(short, long)]
        to: CardFormat,

        /// Output file, or directory when the input holds several cards
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// External program run on every image as `<program> <args..> <in> <out>`
        #[arg(long)]
        optimizer: Option<PathBuf>,

        /// Extra argument passed to the optimizer (repeatable)
        #[arg(long = "optimizer-arg", requires = "optimizer")]
        optimizer_args: Vec<String>,
    },

    /// Check whether a file's cards can be exported to a format
    Validate {
        /// Input file
        input: PathBuf,

        /// Target format (json, png, charx, voxta)
        #[arg(long = "for")]
        target: CardFormat,

        /// Print the reports as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref(), &cli.limits)?;
    let session = Session::new(config);

    match cli.command {
        Commands::Detect { input } => {
            cmd_detect(&session, &input)?;
        }
        Commands::Inspect { input } => {
            cmd_inspect(&session, &input)?;
        }
        Commands::Convert {
            input,
            to,
            output,
            optimizer,
            optimizer_args,
        } => {
            let optimizer: Box<dyn MediaOptimizer> = match optimizer {
                Some(program) => Box::new(
                    optimizer_args
                        .into_iter()
                        .fold(CommandOptimizer::new(program), CommandOptimizer::arg),
                ),
                None => Box::new(Passthrough),
            };
            cmd_convert(&session, &input, to, output.as_deref(), optimizer.as_ref())?;
        }
        Commands::Validate { input, target, json } => {
            cmd_validate(&session, &input, target, json)?;
        }
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` applies unless `-v` is given.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>, overrides: &LimitArgs) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let limits = &mut config.limits;
    if let Some(v) = overrides.png_max_bytes {
        limits.png_max_bytes = v;
        limits.png_warn_bytes = limits.png_warn_bytes.min(v);
    }
    if let Some(v) = overrides.zip_max_total_bytes {
        limits.zip_max_total_bytes = v;
        limits.zip_warn_total_bytes = limits.zip_warn_total_bytes.min(v);
    }
    if let Some(v) = overrides.zip_max_entries {
        limits.zip_max_entries = v;
    }
    if let Some(v) = overrides.zip_max_entry_bytes {
        limits.zip_max_entry_bytes = v;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// In-memory repository and storage for one command.
struct Session {
    registry: HandlerRegistry,
    repository: MemoryRepository,
    storage: MemoryStorage,
    config: PipelineConfig,
}

impl Session {
    fn new(config: PipelineConfig) -> Self {
        Self {
            registry: HandlerRegistry::with_defaults(),
            repository: MemoryRepository::new(),
            storage: MemoryStorage::new(),
            config,
        }
    }

    /// Import a file, printing its warnings. Fails when nothing was imported.
    fn import(&self, path: &Path) -> Result<ImportResult> {
        let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let start = Instant::now();

        let result = self
            .registry
            .import(&ImportContext {
                data: &data,
                filename: path.file_name().and_then(|n| n.to_str()),
                mimetype: None,
                repository: &self.repository,
                storage: &self.storage,
                schema: &RequireName,
                config: &self.config,
            })
            .with_context(|| format!("Failed to import {}", path.display()))?;

        for warning in &result.warnings {
            eprintln!("warning: {warning}");
        }
        if !result.success {
            bail!(
                "Failed to import {}: {}",
                path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        tracing::debug!(elapsed = ?start.elapsed(), cards = result.card_ids.len(), "import finished");
        Ok(result)
    }

    fn export_context<'a>(&'a self, card_id: &'a str, optimizer: &'a dyn MediaOptimizer) -> ExportContext<'a> {
        ExportContext {
            card_id,
            repository: &self.repository,
            storage: &self.storage,
            optimizer,
            config: &self.config,
        }
    }
}

fn cmd_detect(session: &Session, input: &Path) -> Result<()> {
    let data = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let hints = Hints::new(input.file_name().and_then(|n| n.to_str()), None);

    for result in session.registry.detect_all(&data, &hints) {
        println!("{:<8} {}", result.format.name(), result.confidence);
    }
    match session.registry.detect(&data, &hints) {
        Some(best) => println!("Detected: {} ({})", best.format, best.confidence),
        None => println!("Detected: nothing"),
    }

    Ok(())
}

fn cmd_inspect(session: &Session, input: &Path) -> Result<()> {
    let result = session.import(input)?;
    if let Some(format) = result.format {
        println!("Format: {format}");
    }
    println!(
        "Cards: {}, stored assets: {}",
        result.card_ids.len(),
        result.assets_imported
    );
    for scenario in &result.scenarios {
        println!("Scenario (not imported): {scenario}");
    }

    for id in &result.card_ids {
        let card = session
            .repository
            .get_card(id)?
            .with_context(|| format!("Card {id} vanished after import"))?;
        println!();
        println!("{} [{}]", card.record.name(), card.record.version());
        if let Some(book) = &card.record.data().character_book {
            println!("  lorebook: {} entries", book.entries.len());
        }

        for link in session.repository.list_assets_for_card(id)? {
            let d = &link.descriptor;
            let size = link
                .asset
                .as_ref()
                .map_or_else(|| "not stored".to_owned(), |a| format!("{} bytes", a.size));
            println!(
                "  {}{:<12} {:<24} .{:<5} {:>14}  {}",
                if d.is_main { "*" } else { " " },
                d.kind,
                d.name,
                d.ext,
                size,
                d.tags.join(", ")
            );
        }
    }

    Ok(())
}

fn cmd_convert(
    session: &Session,
    input: &Path,
    to: CardFormat,
    output: Option<&Path>,
    optimizer: &dyn MediaOptimizer,
) -> Result<()> {
    let imported = session.import(input)?;
    let multiple = imported.card_ids.len() > 1;

    let pb = ProgressBar::new(imported.card_ids.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    if !multiple {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let mut taken = HashSet::new();
    let mut failures = 0usize;
    for id in &imported.card_ids {
        let result = session
            .registry
            .export(to, &session.export_context(id, optimizer))
            .with_context(|| format!("Failed to export card {id}"))?;

        for warning in &result.warnings {
            pb.suspend(|| eprintln!("warning: {warning}"));
        }
        if !result.success {
            failures += 1;
            pb.suspend(|| {
                eprintln!(
                    "error: card {id}: {}",
                    result.error.as_deref().unwrap_or("export failed")
                )
            });
            pb.inc(1);
            continue;
        }

        let target = output_path(input, output, &result.filename, multiple, &mut taken);
        write_atomic(&target, &result.buffer)?;
        pb.set_message(result.filename.clone());
        pb.suspend(|| println!("Wrote {} ({} bytes)", target.display(), result.buffer.len()));
        pb.inc(1);
    }
    pb.finish_and_clear();

    if failures > 0 {
        bail!("{failures} of {} card(s) could not be exported", imported.card_ids.len());
    }
    Ok(())
}

fn cmd_validate(session: &Session, input: &Path, target: CardFormat, json: bool) -> Result<()> {
    let imported = session.import(input)?;

    let mut reports: Vec<(String, ValidationReport)> = Vec::new();
    for id in &imported.card_ids {
        let report = session
            .registry
            .check(target, &session.export_context(id, &Passthrough))?
            .with_context(|| format!("Card {id} vanished after import"))?;
        let name = session
            .repository
            .get_card(id)?
            .map(|c| c.record.name().to_owned())
            .unwrap_or_default();
        reports.push((name, report));
    }

    if json {
        let out: Vec<_> = reports
            .iter()
            .map(|(name, report)| serde_json::json!({ "card": name, "report": report }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for (name, report) in &reports {
            let verdict = if report.valid { "ok" } else { "blocked" };
            println!("{name}: {verdict} for {target}");
            for error in &report.errors {
                println!("  error: {error}");
            }
            for warning in &report.warnings {
                println!("  warning: {warning}");
            }
            for fix in &report.fixes {
                println!("  fix: {fix}");
            }
        }
    }

    if reports.iter().any(|(_, r)| !r.valid) {
        bail!("Validation failed for {target}");
    }
    Ok(())
}

/// Where to write one exported card.
///
/// Without `-o` the file lands next to the input. With several cards, or
/// when `-o` is an existing directory, `-o` is a directory. Names already
/// written in this run get a numeric suffix.
fn output_path(
    input: &Path,
    output: Option<&Path>,
    filename: &str,
    multiple: bool,
    taken: &mut HashSet<PathBuf>,
) -> PathBuf {
    let dir = match output {
        Some(out) if !multiple && !out.is_dir() => {
            taken.insert(out.to_path_buf());
            return out.to_path_buf();
        }
        Some(out) => out.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let candidate = dir.join(filename);
    if taken.insert(candidate.clone()) {
        return candidate;
    }
    let (stem, ext) = filename.rsplit_once('.').unwrap_or((filename, ""));
    (2..)
        .map(|n| {
            if ext.is_empty() {
                dir.join(format!("{stem}-{n}"))
            } else {
                dir.join(format!("{stem}-{n}.{ext}"))
            }
        })
        .find(|path| taken.insert(path.clone()))
        .unwrap_or(candidate)
}

/// Write through a temp file beside `target`, then rename onto it.
fn write_atomic(target: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut artifact = TempArtifact::beside(target)?;
    artifact.write_all(data)?;
    artifact
        .persist(target)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_single_file() {
        let mut taken = HashSet::new();
        let path = output_path(
            Path::new("in/ava.png"),
            Some(Path::new("out/ava.charx")),
            "Ava.charx",
            false,
            &mut taken,
        );
        assert_eq!(path, PathBuf::from("out/ava.charx"));

        let path = output_path(Path::new("in/ava.png"), None, "Ava.charx", false, &mut taken);
        assert_eq!(path, PathBuf::from("in/Ava.charx"));
    }

    #[test]
    fn test_output_path_collection_dedupes() {
        let mut taken = HashSet::new();
        let out = Some(Path::new("cards"));
        let a = output_path(Path::new("all.json"), out, "Ava.json", true, &mut taken);
        let b = output_path(Path::new("all.json"), out, "Ava.json", true, &mut taken);
        let c = output_path(Path::new("all.json"), out, "Ava.json", true, &mut taken);
        assert_eq!(a, PathBuf::from("cards/Ava.json"));
        assert_eq!(b, PathBuf::from("cards/Ava-2.json"));
        assert_eq!(c, PathBuf::from("cards/Ava-3.json"));
    }

    #[test]
    fn test_write_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("card.json");
        write_atomic(&target, b"{}").unwrap();
        write_atomic(&target, b"{\"name\":\"Ava\"}").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"{\"name\":\"Ava\"}");

        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_limit_overrides() {
        let overrides = LimitArgs {
            png_max_bytes: Some(1024),
            zip_max_total_bytes: None,
            zip_max_entries: Some(3),
            zip_max_entry_bytes: None,
        };
        let config = load_config(None, &overrides).unwrap();
        assert_eq!(config.limits.png_max_bytes, 1024);
        assert!(config.limits.png_warn_bytes <= 1024);
        assert_eq!(config.limits.zip_max_entries, 3);
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "cardsmith", "-v", "convert", "a.png", "--to", "charx", "-o", "b.charx",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Convert { to, output, .. } => {
                assert_eq!(to, CardFormat::Charx);
                assert_eq!(output, Some(PathBuf::from("b.charx")));
            }
            _ => panic!("expected convert"),
        }
    }
}
