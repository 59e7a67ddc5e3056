//! Central directory file headers.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Fixed part of a central directory entry, signature excluded.
///
/// Name, extra field and comment follow it, in that order. The sizes
/// declared here, after ZIP64 widening, are what preflight limits apply to.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct CentralDirectoryHeader {
    pub made_by: u16,
    pub needed: u16,
    pub flags: u16,
    pub method: u16,
    /// DOS time in the low half, DOS date in the high half.
    pub dos_datetime: u32,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_len: u16,
    pub extra_len: u16,
    pub comment_len: u16,
    pub start_disk: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub local_offset: u32,
}

impl CentralDirectoryHeader {
    pub const MAGIC: [u8; 4] = *b"PK\x01\x02";

    const ENCRYPTED: u16 = 1;

    pub fn is_encrypted(&self) -> bool {
        self.flags & Self::ENCRYPTED != 0
    }
}

/// Extra field header ids.
pub mod extra_field {
    pub const ZIP64: u16 = 0x0001;
}
