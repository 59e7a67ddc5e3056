//! Archive preflight.
//!
//! Walks the central directory of an in-memory archive and sums the
//! declared sizes of every member before anything is decompressed. Archives
//! that would expand past the configured ceilings are rejected here, so a
//! zip bomb costs one pass over its metadata and nothing more.

use cardsmith_common::BinaryReader;

use crate::structs::central_dir::extra_field;
use crate::structs::{CentralDirectoryHeader, Eocd64Locator, Eocd64Record, EocdRecord};
use crate::{Error, Result};

/// Ceilings applied during preflight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZipLimits {
    /// Reject when the summed uncompressed size exceeds this.
    pub max_total_bytes: u64,
    /// Log a warning when the summed uncompressed size exceeds this.
    pub warn_total_bytes: u64,
    /// Reject when the archive has more members than this.
    pub max_entries: u64,
    /// Reject when a single member declares more than this.
    pub max_entry_bytes: u64,
}

impl Default for ZipLimits {
    fn default() -> Self {
        Self {
            max_total_bytes: 512 * 1024 * 1024,
            warn_total_bytes: 128 * 1024 * 1024,
            max_entries: 10_000,
            max_entry_bytes: 128 * 1024 * 1024,
        }
    }
}

impl ZipLimits {
    /// Limits that accept anything; used for metadata-only listing.
    pub const UNBOUNDED: Self = Self {
        max_total_bytes: u64::MAX,
        warn_total_bytes: u64::MAX,
        max_entries: u64::MAX,
        max_entry_bytes: u64::MAX,
    };
}

/// Metadata of one archive member as declared by the central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// Member path with `/` separators.
    pub name: String,
    /// Declared compressed size.
    pub compressed_size: u64,
    /// Declared uncompressed size.
    pub uncompressed_size: u64,
    /// Raw compression method.
    pub compression_method: u16,
    /// Whether the member is encrypted.
    pub encrypted: bool,
}

impl EntryMeta {
    /// Whether the member is a directory marker.
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Whether the name is a relative path without `..` components.
    pub fn is_safe_path(&self) -> bool {
        is_safe_path(&self.name)
    }
}

/// Result of a successful preflight.
#[derive(Debug, Clone)]
pub struct Preflight {
    entries: Vec<EntryMeta>,
    total_uncompressed: u64,
    over_warn: bool,
}

impl Preflight {
    /// Scan an archive held in memory and enforce `limits`.
    pub fn scan(data: &[u8], limits: &ZipLimits) -> Result<Self> {
        let (count, cd_offset, cd_size) = locate_central_directory(data)?;

        if count > limits.max_entries {
            return Err(Error::TooManyEntries {
                count,
                limit: limits.max_entries,
            });
        }

        let cd_end = cd_offset.saturating_add(cd_size);
        if cd_end > data.len() as u64 {
            return Err(Error::EocdNotFound);
        }

        let mut reader = BinaryReader::new(&data[cd_offset as usize..cd_end as usize]);
        let mut entries = Vec::with_capacity(count.min(4096) as usize);
        let mut total: u64 = 0;

        for _ in 0..count {
            let entry = read_entry(&mut reader)?;

            if entry.uncompressed_size > limits.max_entry_bytes {
                return Err(Error::EntryTooLarge {
                    name: entry.name,
                    size: entry.uncompressed_size,
                    limit: limits.max_entry_bytes,
                });
            }

            total = total.saturating_add(entry.uncompressed_size);
            if total > limits.max_total_bytes {
                return Err(Error::TooLarge {
                    total,
                    limit: limits.max_total_bytes,
                });
            }

            entries.push(entry);
        }

        let over_warn = total > limits.warn_total_bytes;
        if over_warn {
            tracing::warn!(
                total,
                threshold = limits.warn_total_bytes,
                "archive expands above the warning threshold"
            );
        }

        tracing::debug!(entries = entries.len(), total, "archive preflight passed");

        Ok(Self {
            entries,
            total_uncompressed: total,
            over_warn,
        })
    }

    /// Member metadata in central-directory order.
    pub fn entries(&self) -> &[EntryMeta] {
        &self.entries
    }

    /// Find a member by exact name.
    pub fn find(&self, name: &str) -> Option<&EntryMeta> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Iterate over member names.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Summed declared uncompressed size.
    pub fn total_uncompressed(&self) -> u64 {
        self.total_uncompressed
    }

    /// Whether the total tripped the warning threshold.
    pub fn is_over_warning(&self) -> bool {
        self.over_warn
    }
}

/// List member names without enforcing any limit.
///
/// Cheap enough for format detection: only the central directory is read.
pub fn list_names(data: &[u8]) -> Result<Vec<String>> {
    Preflight::scan(data, &ZipLimits::UNBOUNDED)
        .map(|p| p.entries.into_iter().map(|e| e.name).collect())
}

/// Check that a member path is relative and free of `..` components.
pub fn is_safe_path(name: &str) -> bool {
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') || normalized.contains(':') {
        return false;
    }
    !normalized.split('/').any(|segment| segment == "..")
}

/// Returns `(entry_count, central_dir_offset, central_dir_size)`.
fn locate_central_directory(data: &[u8]) -> Result<(u64, u64, u64)> {
    let eocd_offset = find_eocd(data)?;
    let mut reader = BinaryReader::new_at(data, eocd_offset + 4);
    let eocd: EocdRecord = reader.read_struct()?;

    if eocd.is_multi_disk() {
        return Err(Error::MultiDisk);
    }

    if eocd.is_zip64() {
        return read_zip64_eocd(data, eocd_offset);
    }

    Ok((
        u64::from(eocd.total_entries),
        u64::from(eocd.cd_offset),
        u64::from(eocd.cd_size),
    ))
}

fn find_eocd(data: &[u8]) -> Result<usize> {
    if data.len() < EocdRecord::ENCODED_LEN {
        return Err(Error::EocdNotFound);
    }

    let search_start = data.len().saturating_sub(EocdRecord::MAX_TAIL);
    let last_start = data.len() - EocdRecord::ENCODED_LEN;
    let window = &data[search_start..last_start + 4];

    memchr::memmem::rfind(window, &EocdRecord::MAGIC)
        .map(|pos| search_start + pos)
        .ok_or(Error::EocdNotFound)
}

fn read_zip64_eocd(data: &[u8], eocd_offset: usize) -> Result<(u64, u64, u64)> {
    let locator_offset = eocd_offset
        .checked_sub(Eocd64Locator::ENCODED_LEN)
        .ok_or(Error::Zip64EocdNotFound)?;

    let mut reader = BinaryReader::new_at(data, locator_offset);
    reader
        .expect_magic(&Eocd64Locator::MAGIC)
        .map_err(|_| Error::Zip64EocdNotFound)?;
    let locator: Eocd64Locator = reader.read_struct()?;

    let record_offset = usize::try_from(locator.eocd64_offset)
        .map_err(|_| Error::Zip64EocdNotFound)?;
    let mut reader = BinaryReader::new_at(data, record_offset);
    reader
        .expect_magic(&Eocd64Record::MAGIC)
        .map_err(|_| Error::InvalidSignature {
            offset: record_offset,
            expected: Eocd64Record::MAGIC,
        })?;
    let record: Eocd64Record = reader.read_struct()?;

    Ok((
        record.total_entries,
        record.cd_offset,
        record.cd_size,
    ))
}

fn read_entry(reader: &mut BinaryReader<'_>) -> Result<EntryMeta> {
    let offset = reader.position();
    reader
        .expect_magic(&CentralDirectoryHeader::MAGIC)
        .map_err(|_| Error::InvalidSignature {
            offset,
            expected: CentralDirectoryHeader::MAGIC,
        })?;

    let header: CentralDirectoryHeader = reader.read_struct()?;
    let name_bytes = reader.read_bytes(header.name_len as usize)?;
    let name = String::from_utf8_lossy(name_bytes).replace('\\', "/");

    let mut compressed_size = u64::from(header.compressed_size);
    let mut uncompressed_size = u64::from(header.uncompressed_size);

    let extra = reader.read_bytes(header.extra_len as usize)?;
    let mut extra_reader = BinaryReader::new(extra);

    while extra_reader.remaining() >= 4 {
        let id = extra_reader.read_u16()?;
        let size = extra_reader.read_u16()? as usize;
        let field = match extra_reader.read_bytes(size) {
            Ok(field) => field,
            // Some writers pad or truncate the extra area; ignore the tail.
            Err(_) => break,
        };

        if id == extra_field::ZIP64 {
            // Values appear only for the header fields that overflowed, in
            // this fixed order.
            let mut zip64 = BinaryReader::new(field);
            if header.uncompressed_size == u32::MAX {
                uncompressed_size = zip64.read_u64()?;
            }
            if header.compressed_size == u32::MAX {
                compressed_size = zip64.read_u64()?;
            }
        }
    }

    reader.advance(header.comment_len as usize);

    Ok(EntryMeta {
        name,
        compressed_size,
        uncompressed_size,
        compression_method: header.method,
        encrypted: header.is_encrypted(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;

    use super::*;

    fn archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in files {
            writer.start_file(name.to_string(), options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_scan_lists_entries() {
        let data = archive(&[("card.json", b"{}"), ("icon/main.png", b"png")]);
        let preflight = Preflight::scan(&data, &ZipLimits::default()).unwrap();

        let names: Vec<_> = preflight.names().collect();
        assert_eq!(names, ["card.json", "icon/main.png"]);
        assert_eq!(preflight.total_uncompressed(), 5);
        assert_eq!(preflight.find("card.json").unwrap().uncompressed_size, 2);
    }

    #[test]
    fn test_rejects_total_over_ceiling() {
        // 1 MiB of zeros deflates to about a kilobyte.
        let zeros = vec![0u8; 1024 * 1024];
        let data = archive(&[("a.bin", &zeros), ("b.bin", &zeros)]);
        assert!(data.len() < 64 * 1024);

        let limits = ZipLimits {
            max_total_bytes: 1024 * 1024 + 1,
            ..ZipLimits::default()
        };
        assert!(matches!(
            Preflight::scan(&data, &limits),
            Err(Error::TooLarge { .. })
        ));
    }

    #[test]
    fn test_rejects_single_entry_over_ceiling() {
        let data = archive(&[("big.bin", &vec![0u8; 4096])]);
        let limits = ZipLimits {
            max_entry_bytes: 1024,
            ..ZipLimits::default()
        };
        assert!(matches!(
            Preflight::scan(&data, &limits),
            Err(Error::EntryTooLarge { size: 4096, .. })
        ));
    }

    #[test]
    fn test_rejects_too_many_entries() {
        let data = archive(&[("a", b"1"), ("b", b"2"), ("c", b"3")]);
        let limits = ZipLimits {
            max_entries: 2,
            ..ZipLimits::default()
        };
        assert!(matches!(
            Preflight::scan(&data, &limits),
            Err(Error::TooManyEntries { count: 3, limit: 2 })
        ));
    }

    #[test]
    fn test_warning_threshold() {
        let data = archive(&[("a.bin", &[1u8; 100])]);
        let limits = ZipLimits {
            warn_total_bytes: 10,
            ..ZipLimits::default()
        };
        assert!(Preflight::scan(&data, &limits).unwrap().is_over_warning());
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            Preflight::scan(b"definitely not an archive", &ZipLimits::default()),
            Err(Error::EocdNotFound)
        ));
    }

    #[test]
    fn test_safe_paths() {
        assert!(is_safe_path("icon/main.png"));
        assert!(!is_safe_path("../etc/passwd"));
        assert!(!is_safe_path("icon/../../x"));
        assert!(!is_safe_path("/abs/path"));
        assert!(!is_safe_path("C:\\windows"));
    }
}
