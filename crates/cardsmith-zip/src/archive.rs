//! Bounded archive reading.
//!
//! [`CardArchive`] pairs a successful [`Preflight`] with the `zip` codec.
//! Reads are capped at each member's declared size, so a header that lies
//! about its uncompressed size cannot inflate past what preflight approved.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::preflight::{EntryMeta, Preflight, ZipLimits};
use crate::structs::CompressionMethod;
use crate::{Error, Result};

/// An in-memory archive that passed preflight.
pub struct CardArchive<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    preflight: Preflight,
}

impl<'a> CardArchive<'a> {
    /// Preflight `data` against `limits`, then open it.
    pub fn open(data: &'a [u8], limits: &ZipLimits) -> Result<Self> {
        let preflight = Preflight::scan(data, limits)?;
        let archive = ZipArchive::new(Cursor::new(data))?;

        Ok(Self { archive, preflight })
    }

    /// Preflight results for this archive.
    pub fn preflight(&self) -> &Preflight {
        &self.preflight
    }

    /// Member metadata in central-directory order.
    pub fn entries(&self) -> &[EntryMeta] {
        self.preflight.entries()
    }

    /// Whether a member with this exact name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.preflight.find(name).is_some()
    }

    /// Read one member by exact name.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let declared = self
            .preflight
            .find(name)
            .map(|e| e.uncompressed_size)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))?;

        let file = self.archive.by_name(name)?;
        read_bounded(file, name, declared)
    }

    /// Read a member as UTF-8 text (BOM stripped).
    pub fn read_string(&mut self, name: &str) -> Result<String> {
        let bytes = self.read(name)?;
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read every regular member with a safe path, keyed by name.
    ///
    /// Directory markers, encrypted members, members using an unsupported
    /// compression method and members whose path escapes the archive root
    /// are skipped with a warning.
    pub fn read_all(&mut self) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut out = BTreeMap::new();

        for (index, meta) in self.preflight.entries().iter().enumerate() {
            if meta.is_dir() {
                continue;
            }
            if meta.encrypted {
                tracing::warn!(name = %meta.name, "skipping encrypted archive entry");
                continue;
            }
            if !meta.is_safe_path() {
                tracing::warn!(name = %meta.name, "skipping archive entry with unsafe path");
                continue;
            }
            if let Err(method) = CompressionMethod::try_from(meta.compression_method) {
                tracing::warn!(name = %meta.name, method, "skipping entry with unsupported compression");
                continue;
            }

            let file = self.archive.by_index(index)?;
            let data = read_bounded(file, &meta.name, meta.uncompressed_size)?;
            out.insert(meta.name.clone(), data);
        }

        Ok(out)
    }
}

impl std::fmt::Debug for CardArchive<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardArchive")
            .field("entries", &self.preflight.entries().len())
            .field("total_uncompressed", &self.preflight.total_uncompressed())
            .finish()
    }
}

fn read_bounded<R: Read>(file: R, name: &str, declared: u64) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(declared.min(16 * 1024 * 1024) as usize);
    file.take(declared.saturating_add(1)).read_to_end(&mut data)?;

    if data.len() as u64 > declared {
        return Err(Error::SizeMismatch {
            name: name.to_string(),
            declared,
        });
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArchiveWriter;

    #[test]
    fn test_read_members() {
        let mut writer = ArchiveWriter::new();
        writer.add("card.json", b"\xEF\xBB\xBF{\"name\":\"Ava\"}").unwrap();
        writer.add("icon/main.png", b"not really a png").unwrap();
        let data = writer.finish().unwrap();

        let mut archive = CardArchive::open(&data, &ZipLimits::default()).unwrap();
        assert!(archive.contains("card.json"));
        assert_eq!(archive.read_string("card.json").unwrap(), "{\"name\":\"Ava\"}");

        let all = archive.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["icon/main.png"], b"not really a png");
    }

    #[test]
    fn test_missing_member() {
        let mut writer = ArchiveWriter::new();
        writer.add("card.json", b"{}").unwrap();
        let data = writer.finish().unwrap();

        let mut archive = CardArchive::open(&data, &ZipLimits::default()).unwrap();
        assert!(matches!(
            archive.read("nope.json"),
            Err(Error::EntryNotFound(_))
        ));
    }

    #[test]
    fn test_open_enforces_preflight() {
        let mut writer = ArchiveWriter::new();
        writer.add("a.bin", &vec![0u8; 2048]).unwrap();
        let data = writer.finish().unwrap();

        let limits = ZipLimits {
            max_total_bytes: 1024,
            ..ZipLimits::default()
        };
        assert!(matches!(
            CardArchive::open(&data, &limits),
            Err(Error::TooLarge { .. })
        ));
    }
}
