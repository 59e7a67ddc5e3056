//! Binary reader for zero-copy parsing of byte slices.
//!
//! [`BinaryReader`] is a cursor over a borrowed slice. ZIP structures are
//! little-endian while PNG chunk headers are big-endian, so both byte orders
//! are exposed.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use zerocopy::FromBytes;

use crate::{Error, Result};

/// A binary reader that provides zero-copy reading from a byte slice.
///
/// # Example
///
/// ```
/// use cardsmith_common::BinaryReader;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x0D];
/// let mut reader = BinaryReader::new(&data);
///
/// assert_eq!(reader.read_u32().unwrap(), 0x04030201);
/// assert_eq!(reader.read_u32_be().unwrap(), 13);
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Create a new reader starting at a specific position.
    #[inline]
    pub const fn new_at(data: &'a [u8], position: usize) -> Self {
        Self { data, position }
    }

    /// Get the current position in the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Get the total length of the underlying buffer.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Get the number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Seek to an absolute position.
    #[inline]
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// Advance the position by a number of bytes.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        self.position = self.position.saturating_add(count);
    }

    /// Get the remaining bytes as a slice.
    #[inline]
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.data[self.position.min(self.data.len())..]
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if available < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available,
            });
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    /// Read a little-endian u16.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_bytes(2).map(LittleEndian::read_u16)
    }

    /// Read a little-endian u32.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_bytes(4).map(LittleEndian::read_u32)
    }

    /// Read a little-endian u64.
    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_bytes(8).map(LittleEndian::read_u64)
    }

    /// Read a big-endian u32 (PNG chunk lengths and CRCs).
    #[inline]
    pub fn read_u32_be(&mut self) -> Result<u32> {
        self.read_bytes(4).map(BigEndian::read_u32)
    }

    /// Read a null-terminated string, as used by PNG text keywords.
    ///
    /// Bytes are interpreted as Latin-1 so that any keyword decodes.
    pub fn read_latin1_cstring(&mut self) -> Result<String> {
        let remaining = self.remaining_bytes();
        let null_pos = memchr::memchr(0, remaining).ok_or(Error::UnexpectedEof {
            needed: remaining.len() + 1,
            available: remaining.len(),
        })?;

        let value = remaining[..null_pos].iter().map(|&b| b as char).collect();
        self.position += null_pos + 1;
        Ok(value)
    }

    /// Read a struct using zerocopy.
    ///
    /// The struct must implement `FromBytes` from the zerocopy crate.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::UnexpectedEof {
            needed: size,
            available: bytes.len(),
        })
    }

    /// Expect specific magic bytes.
    pub fn expect_magic(&mut self, expected: &[u8]) -> Result<()> {
        let actual = self.read_bytes(expected.len())?;
        if actual != expected {
            return Err(Error::InvalidMagic {
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_mixed_endianness() {
        let data = [
            0x01u8, 0x02, 0x03, 0x04, // LE u32: 0x04030201
            0x00, 0x00, 0x01, 0x00, // BE u32: 256
        ];
        let mut reader = BinaryReader::new(&data);

        assert_eq!(reader.read_u32().unwrap(), 0x04030201);
        assert_eq!(reader.read_u32_be().unwrap(), 256);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_latin1_cstring() {
        let data = b"chara\0payload";
        let mut reader = BinaryReader::new(data);

        assert_eq!(reader.read_latin1_cstring().unwrap(), "chara");
        assert_eq!(reader.remaining_bytes(), b"payload");
    }

    #[test]
    fn test_cstring_without_terminator() {
        let mut reader = BinaryReader::new(b"no-null");
        assert!(reader.read_latin1_cstring().is_err());
    }

    #[test]
    fn test_seek_and_advance() {
        let data = [0x01, 0x02, 0x03, 0x04, 0xFF];
        let mut reader = BinaryReader::new_at(&data, 4);
        assert_eq!(reader.read_u8().unwrap(), 0xFF);

        reader.seek(0);
        reader.advance(2);
        assert_eq!(reader.read_u16().unwrap(), 0x0403);
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_expect_magic() {
        let mut reader = BinaryReader::new(b"PK\x03\x04");
        assert!(reader.expect_magic(b"PK\x03\x04").is_ok());

        let mut reader = BinaryReader::new(b"GIF8");
        assert!(matches!(
            reader.expect_magic(b"PK\x03\x04"),
            Err(Error::InvalidMagic { .. })
        ));
    }

    #[test]
    fn test_eof_error() {
        let data = [0x01, 0x02];
        let mut reader = BinaryReader::new(&data);

        assert!(reader.read_u32().is_err());
    }
}
