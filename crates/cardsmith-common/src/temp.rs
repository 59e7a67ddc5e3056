//! Scoped temporary files.
//!
//! Some collaborators only accept file paths (external media tools, atomic
//! output writes). [`TempArtifact`] owns such a file for the duration of one
//! operation; the file is deleted when the guard drops, which covers early
//! returns, `?` propagation and panic unwinding alike.

use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use crate::Result;

/// A temporary file that is removed when dropped.
#[derive(Debug)]
pub struct TempArtifact {
    file: NamedTempFile,
}

impl TempArtifact {
    /// Create an empty temporary file with the given extension in the system temp dir.
    pub fn new(ext: &str) -> Result<Self> {
        let file = Builder::new()
            .prefix("cardsmith-")
            .suffix(&suffix(ext))
            .tempfile()?;
        tracing::trace!(path = %file.path().display(), "created temp artifact");
        Ok(Self { file })
    }

    /// Create a temporary file next to `target`, so it can later be persisted
    /// onto it with an atomic rename.
    pub fn beside(target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file = Builder::new()
            .prefix(".cardsmith-")
            .suffix(".partial")
            .tempfile_in(dir)?;
        Ok(Self { file })
    }

    /// Create a temporary file holding `data`.
    pub fn with_contents(data: &[u8], ext: &str) -> Result<Self> {
        let mut artifact = Self::new(ext)?;
        artifact.file.write_all(data)?;
        artifact.file.flush()?;
        Ok(artifact)
    }

    /// Path of the temporary file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Read the current contents back.
    pub fn read(&self) -> Result<Vec<u8>> {
        Ok(fs::read(self.file.path())?)
    }

    /// Write `data`, replacing any previous contents.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let file = self.file.as_file_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    /// Atomically move the file onto `target`, consuming the guard.
    pub fn persist(self, target: &Path) -> Result<()> {
        self.file
            .persist(target)
            .map_err(|e| crate::Error::Io(e.error))?;
        Ok(())
    }
}

fn suffix(ext: &str) -> String {
    let ext = ext.trim_start_matches('.');
    if ext.is_empty() {
        String::new()
    } else {
        format!(".{ext}")
    }
}
