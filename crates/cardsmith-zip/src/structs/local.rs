//! Local file header signature.

/// Local File Header.
///
/// Only the signature matters here: it is the magic number every ZIP-based
/// card container starts with, and format detection keys on it. Member data
/// itself is read through the `zip` crate after preflight.
pub struct LocalFileHeader;

impl LocalFileHeader {
    /// Local File Header signature bytes.
    pub const MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

    /// Signature of an empty archive (EOCD with no members), which is
    /// still a ZIP but never a card container.
    pub const EMPTY_ARCHIVE_MAGIC: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
}
