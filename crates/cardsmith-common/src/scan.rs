//! Byte pattern searching.
//!
//! Thin wrappers over memchr's SIMD implementations (AVX2, SSE2, NEON with a
//! scalar fallback). Used for animation marker detection and for sniffing
//! container contents without a full decode.

/// Find the first occurrence of a byte in a slice.
#[inline]
pub fn find_byte(needle: u8, data: &[u8]) -> Option<usize> {
    memchr::memchr(needle, data)
}

/// Find a multi-byte pattern in a slice.
#[inline]
pub fn find_pattern(needle: &[u8], haystack: &[u8]) -> Option<usize> {
    memchr::memmem::find(haystack, needle)
}

/// Check whether a pattern occurs anywhere in the slice.
#[inline]
pub fn contains_pattern(needle: &[u8], haystack: &[u8]) -> bool {
    find_pattern(needle, haystack).is_some()
}

/// Count non-overlapping occurrences of a pattern, stopping once `limit` is reached.
///
/// Callers that only need "more than N" pass `N + 1` to avoid scanning the
/// whole buffer.
pub fn count_pattern(needle: &[u8], haystack: &[u8], limit: usize) -> usize {
    memchr::memmem::find_iter(haystack, needle).take(limit).count()
}

/// Skip leading ASCII whitespace and a UTF-8 byte order mark.
pub fn trim_start(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    &data[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_pattern() {
        assert_eq!(find_pattern(b"ANIM", b"RIFF....WEBPVP8XANIM"), Some(16));
        assert_eq!(find_pattern(b"ANIM", b"RIFF....WEBPVP8 "), None);
    }

    #[test]
    fn test_count_pattern_respects_limit() {
        let data = b"\x21\xF9\x04..\x21\xF9\x04..\x21\xF9\x04";
        assert_eq!(count_pattern(b"\x21\xF9\x04", data, 10), 3);
        assert_eq!(count_pattern(b"\x21\xF9\x04", data, 2), 2);
    }

    #[test]
    fn test_trim_start() {
        assert_eq!(trim_start(b"\xEF\xBB\xBF  \n{}"), b"{}");
        assert_eq!(trim_start(b"   "), b"");
    }
}
