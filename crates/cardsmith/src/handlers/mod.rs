//! Built-in format handlers.

mod charx;
mod json;
mod png;
mod voxta;

pub use charx::CharxHandler;
pub use json::JsonHandler;
pub use png::PngHandler;
pub use voxta::VoxtaHandler;

use cardsmith_zip::Preflight;

use crate::{Error, Result};

/// Decode UTF-8 text, dropping a byte order mark.
fn utf8_text<'a>(data: &'a [u8], what: &str) -> Result<&'a str> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    std::str::from_utf8(data).map_err(|e| Error::InvalidContainer(format!("{what} is not UTF-8: {e}")))
}

/// Warning raised when an archive passed preflight above the soft limit.
fn preflight_warning(preflight: &Preflight) -> Option<String> {
    preflight.is_over_warning().then(|| {
        format!(
            "archive expands to {} bytes, above the warning threshold",
            preflight.total_uncompressed()
        )
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! In-memory fixtures shared by handler tests.

    use std::io::{Cursor, Write};

    use image::{ImageFormat, Rgba, RgbaImage};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use crate::config::PipelineConfig;
    use crate::handler::{ExportContext, ImportContext};
    use crate::media::Passthrough;
    use crate::repository::{MemoryRepository, MemoryStorage};
    use crate::schema::PermissiveSchema;

    pub fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([rgb[0], rgb[1], rgb[2], 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    pub fn zip(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in members {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Repository, storage and config for a pipeline run.
    #[derive(Default)]
    pub struct Env {
        pub repository: MemoryRepository,
        pub storage: MemoryStorage,
        pub config: PipelineConfig,
    }

    impl Env {
        pub fn import<'a>(&'a self, data: &'a [u8], filename: Option<&'a str>) -> ImportContext<'a> {
            ImportContext {
                data,
                filename,
                mimetype: None,
                repository: &self.repository,
                storage: &self.storage,
                schema: &PermissiveSchema,
                config: &self.config,
            }
        }

        pub fn export<'a>(&'a self, card_id: &'a str) -> ExportContext<'a> {
            ExportContext {
                card_id,
                repository: &self.repository,
                storage: &self.storage,
                optimizer: &Passthrough,
                config: &self.config,
            }
        }
    }
}
