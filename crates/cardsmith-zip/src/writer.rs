//! Deterministic archive writing.
//!
//! Members are written in the order they are added, every timestamp is
//! pinned to 1980-01-01 00:00:00 (the DOS epoch) and compression settings
//! depend only on the member name. Two exports of the same inputs therefore
//! produce identical bytes.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::Result;

/// Extensions whose payload is already compressed; stored rather than deflated.
const STORED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "avif", "mp3", "ogg", "m4a", "mp4", "webm", "zip",
];

/// Builds an archive in memory.
pub struct ArchiveWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    names: Vec<String>,
}

impl ArchiveWriter {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            names: Vec::new(),
        }
    }

    /// Add a member. Separators are normalized to `/`.
    pub fn add(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let path = path.replace('\\', "/");
        let options = options_for(&path);

        self.zip.start_file(path.clone(), options)?;
        self.zip.write_all(data)?;
        tracing::trace!(%path, size = data.len(), "wrote archive member");
        self.names.push(path);
        Ok(())
    }

    /// Names added so far, in write order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Finish the archive and return its bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        Ok(self.zip.finish()?.into_inner())
    }
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn options_for(path: &str) -> SimpleFileOptions {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let method = if STORED_EXTENSIONS.contains(&ext.as_str()) {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflated
    };

    SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}
