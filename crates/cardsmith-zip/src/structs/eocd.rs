//! End of central directory records.
//!
//! Preflight finds the classic record by scanning the tail of the file, then
//! follows the ZIP64 locator when any of its counts or offsets is saturated.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Classic end-of-central-directory record, signature excluded.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct EocdRecord {
    pub this_disk: u16,
    pub cd_start_disk: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    /// Bytes of archive comment that follow the record.
    pub comment_len: u16,
}

impl EocdRecord {
    pub const MAGIC: [u8; 4] = *b"PK\x05\x06";

    /// Signature plus fixed fields.
    pub const ENCODED_LEN: usize = 4 + std::mem::size_of::<Self>();

    /// How far from the end the record can start.
    pub const MAX_TAIL: usize = Self::ENCODED_LEN + u16::MAX as usize;

    /// Saturated fields mean the real values live in the ZIP64 record.
    pub fn is_zip64(&self) -> bool {
        self.total_entries == u16::MAX || self.cd_offset == u32::MAX || self.cd_size == u32::MAX
    }

    pub fn is_multi_disk(&self) -> bool {
        self.this_disk != 0 || self.cd_start_disk != 0
    }
}

/// Pointer to the ZIP64 record, stored right before the classic one.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct Eocd64Locator {
    pub eocd64_disk: u32,
    pub eocd64_offset: u64,
    pub disk_count: u32,
}

impl Eocd64Locator {
    pub const MAGIC: [u8; 4] = *b"PK\x06\x07";
    pub const ENCODED_LEN: usize = 4 + std::mem::size_of::<Self>();
}

/// ZIP64 end-of-central-directory record, signature excluded.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct Eocd64Record {
    pub remaining_len: u64,
    pub made_by: u16,
    pub needed: u16,
    pub this_disk: u32,
    pub cd_start_disk: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Eocd64Record {
    pub const MAGIC: [u8; 4] = *b"PK\x06\x06";
}
