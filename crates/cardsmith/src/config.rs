//! Pipeline configuration.

use std::path::Path;

use cardsmith_png::SizeGate;
use cardsmith_zip::ZipLimits;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MIB: u64 = 1024 * 1024;

/// Input size ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub png_warn_bytes: u64,
    pub png_max_bytes: u64,
    pub zip_max_total_bytes: u64,
    pub zip_warn_total_bytes: u64,
    pub zip_max_entries: u64,
    pub zip_max_entry_bytes: u64,
    pub text_chunk_max_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            png_warn_bytes: 16 * MIB,
            png_max_bytes: 64 * MIB,
            zip_max_total_bytes: 512 * MIB,
            zip_warn_total_bytes: 128 * MIB,
            zip_max_entries: 10_000,
            zip_max_entry_bytes: 128 * MIB,
            text_chunk_max_bytes: 32 * MIB,
        }
    }
}

/// Settings shared by every handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub limits: Limits,
    /// Size of the image synthesized when a PNG export has no portrait.
    pub placeholder_width: u32,
    pub placeholder_height: u32,
    /// Embed stored assets as `data:` URIs in JSON exports.
    pub json_embed_assets: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            placeholder_width: 400,
            placeholder_height: 600,
            json_embed_assets: true,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<()> {
        let l = &self.limits;
        if l.png_warn_bytes > l.png_max_bytes {
            return Err(Error::Config("png_warn_bytes exceeds png_max_bytes".into()));
        }
        if l.zip_warn_total_bytes > l.zip_max_total_bytes {
            return Err(Error::Config(
                "zip_warn_total_bytes exceeds zip_max_total_bytes".into(),
            ));
        }
        if self.placeholder_width == 0 || self.placeholder_height == 0 {
            return Err(Error::Config("placeholder dimensions must be non-zero".into()));
        }
        Ok(())
    }

    /// PNG size gate derived from the limits.
    pub fn size_gate(&self) -> SizeGate {
        SizeGate {
            warn_bytes: clamp_usize(self.limits.png_warn_bytes),
            max_bytes: clamp_usize(self.limits.png_max_bytes),
            text_max_bytes: clamp_usize(self.limits.text_chunk_max_bytes),
        }
    }

    /// ZIP preflight limits derived from the limits.
    pub fn zip_limits(&self) -> ZipLimits {
        ZipLimits {
            max_total_bytes: self.limits.zip_max_total_bytes,
            warn_total_bytes: self.limits.zip_warn_total_bytes,
            max_entries: self.limits.zip_max_entries,
            max_entry_bytes: self.limits.zip_max_entry_bytes,
        }
    }
}

fn clamp_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"limits":{"zip_max_entries":5},"json_embed_assets":false}"#)
                .unwrap();
        assert_eq!(config.limits.zip_max_entries, 5);
        assert_eq!(config.limits.png_max_bytes, 64 * MIB);
        assert_eq!(config.placeholder_width, 400);
        assert!(!config.json_embed_assets);
    }

    #[test]
    fn test_load_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cardsmith.json");
        std::fs::write(&path, r#"{"limits":{"png_warn_bytes":10,"png_max_bytes":5}}"#).unwrap();
        assert!(matches!(PipelineConfig::load(&path), Err(Error::Config(_))));

        std::fs::write(&path, r#"{"placeholder_width":64}"#).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap().placeholder_width, 64);
    }

    #[test]
    fn test_derived_limits() {
        let config = PipelineConfig::default();
        assert_eq!(config.size_gate().max_bytes, 64 * 1024 * 1024);
        assert_eq!(config.zip_limits().max_entries, 10_000);
    }
}
