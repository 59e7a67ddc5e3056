//! Media hooks used on export.
//!
//! Compression policy is not part of the pipeline; a [`MediaOptimizer`] is
//! plugged in instead. The helpers below cover the two image operations the
//! PNG encoder cannot avoid: transcoding a non-PNG carrier and synthesizing
//! a placeholder when there is no portrait at all.

use std::io::Cursor;
use std::path::PathBuf;
use std::process::Command;

use cardsmith_common::{hash, TempArtifact};
use image::{ImageFormat, Rgba, RgbaImage};

use crate::{Error, Result};

/// Pluggable per-asset optimization step.
pub trait MediaOptimizer: Send + Sync {
    /// Return the bytes to write for an asset. `ext` has no leading dot.
    fn optimize(&self, data: Vec<u8>, mimetype: &str, ext: &str) -> Result<Vec<u8>>;
}

/// Writes assets unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl MediaOptimizer for Passthrough {
    fn optimize(&self, data: Vec<u8>, _mimetype: &str, _ext: &str) -> Result<Vec<u8>> {
        Ok(data)
    }
}

/// Runs an external program as `<program> <args..> <input> <output>`.
///
/// Both paths are temporary files removed when the call returns, whether
/// the program succeeds, fails or the call unwinds.
#[derive(Debug, Clone)]
pub struct CommandOptimizer {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Only assets whose MIME type starts with one of these are processed.
    pub mime_prefixes: Vec<String>,
}

impl CommandOptimizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            mime_prefixes: vec!["image/".into()],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn applies_to(&self, mimetype: &str) -> bool {
        self.mime_prefixes.iter().any(|p| mimetype.starts_with(p.as_str()))
    }
}

impl MediaOptimizer for CommandOptimizer {
    fn optimize(&self, data: Vec<u8>, mimetype: &str, ext: &str) -> Result<Vec<u8>> {
        if !self.applies_to(mimetype) {
            return Ok(data);
        }

        let input = TempArtifact::with_contents(&data, ext)?;
        let output = TempArtifact::new(ext)?;

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(input.path())
            .arg(output.path())
            .status()?;
        if !status.success() {
            return Err(Error::Optimizer(format!(
                "{} exited with {status}",
                self.program.display()
            )));
        }

        let optimized = output.read()?;
        if optimized.is_empty() {
            tracing::warn!(program = %self.program.display(), "optimizer produced no output, keeping original");
            return Ok(data);
        }
        tracing::debug!(before = data.len(), after = optimized.len(), "optimized asset");
        Ok(optimized)
    }
}

/// Re-encode any supported raster image as PNG.
pub fn transcode_to_png(data: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(data)?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Solid colour derived from `name`; the same name always gives the same colour.
pub fn placeholder_color(name: &str) -> [u8; 4] {
    let [r, g, b, _] = hash::fingerprint32(name).to_be_bytes();
    // Each channel lands in 64..=191.
    [r / 2 + 64, g / 2 + 64, b / 2 + 64, 255]
}

/// A solid-colour PNG used when a PNG export has no source image.
pub fn placeholder_png(name: &str, width: u32, height: u32) -> Result<Vec<u8>> {
    let img = RgbaImage::from_pixel(width, height, Rgba(placeholder_color(name)));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
