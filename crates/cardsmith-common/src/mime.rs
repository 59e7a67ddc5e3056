//! MIME type detection.
//!
//! Asset bytes are sniffed by magic number first; the file extension is only
//! consulted when the content is not recognized.

/// Fallback MIME type for unknown content.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Sniff a MIME type from the leading bytes of a buffer.
pub fn sniff(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("image/png");
    }
    if data.starts_with(b"\xFF\xD8\xFF") {
        return Some("image/jpeg");
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if data.len() >= 12 && &data[..4] == b"RIFF" {
        match &data[8..12] {
            b"WEBP" => return Some("image/webp"),
            b"WAVE" => return Some("audio/wav"),
            _ => {}
        }
    }
    if data.starts_with(b"BM") && data.len() >= 14 {
        return Some("image/bmp");
    }
    if data.starts_with(b"OggS") {
        return Some("audio/ogg");
    }
    if data.starts_with(b"ID3") || (data.len() >= 2 && data[0] == 0xFF && data[1] & 0xE0 == 0xE0)
    {
        return Some("audio/mpeg");
    }
    if data.starts_with(b"fLaC") {
        return Some("audio/flac");
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return Some(match &data[8..12] {
            b"avif" | b"avis" => "image/avif",
            b"M4A " => "audio/mp4",
            _ => "video/mp4",
        });
    }
    if data.starts_with(b"\x1A\x45\xDF\xA3") {
        return Some("video/webm");
    }
    if data.starts_with(b"PK\x03\x04") {
        return Some("application/zip");
    }
    None
}

/// Map a file extension (without the dot, any case) to a MIME type.
pub fn from_extension(ext: &str) -> &'static str {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "json" => "application/json",
        "txt" => "text/plain",
        "zip" | "charx" | "voxpkg" => "application/zip",
        _ => OCTET_STREAM,
    }
}

/// Map a MIME type to the conventional file extension.
pub fn extension_for(mimetype: &str) -> Option<&'static str> {
    Some(match mimetype {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "audio/mpeg" => "mp3",
        "audio/ogg" => "ogg",
        "audio/wav" => "wav",
        "audio/flac" => "flac",
        "audio/mp4" => "m4a",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "application/json" => "json",
        "text/plain" => "txt",
        _ => return None,
    })
}

/// Detect a MIME type from content, falling back to the extension.
pub fn detect(data: &[u8], ext: &str) -> &'static str {
    sniff(data).unwrap_or_else(|| from_extension(ext))
}

/// Whether the MIME type denotes a raster image.
pub fn is_image(mimetype: &str) -> bool {
    mimetype.starts_with("image/") && mimetype != "image/svg+xml"
}
