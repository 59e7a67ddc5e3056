//! Semantic tag heuristics.
//!
//! Tags come from three places: the source descriptor (filtered to the
//! recognized set), the descriptor's type and name, and a byte-pattern scan
//! of the asset for animation markers. Nothing here decodes an image.

use cardsmith_card::asset::{kind, tags};
use cardsmith_card::AssetDescriptor;
use cardsmith_common::scan;

/// GIF application extension announcing a looping animation.
const GIF_NETSCAPE: &[u8] = b"NETSCAPE2.0";
/// GIF graphics control extension introducer.
const GIF_GCE: &[u8] = &[0x21, 0xF9, 0x04];

/// Derive the final tag list for an asset.
///
/// Order: recognized source tags first (in source order), then type/name
/// tags, then `animated`. Duplicates are dropped keeping the first.
pub fn derive_tags(descriptor: &AssetDescriptor, bytes: Option<&[u8]>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(descriptor.tags.len() + 2);
    let mut push = |tag: &str| {
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_owned());
        }
    };

    for tag in &descriptor.tags {
        if tags::is_recognized(tag) {
            push(tag);
        } else {
            tracing::debug!(%tag, asset = %descriptor.name, "dropping unrecognized tag");
        }
    }

    if descriptor.name == "main" {
        match descriptor.kind.as_str() {
            kind::ICON => push(tags::PORTRAIT_OVERRIDE),
            kind::BACKGROUND => push(tags::MAIN_BACKGROUND),
            _ => {}
        }
    }

    if bytes.is_some_and(is_animated) {
        push(tags::ANIMATED);
    }

    out
}

/// Whether an image is animated, judged by markers only.
///
/// WebP: an `ANIM` chunk. GIF: a `NETSCAPE2.0` application extension, or
/// more than one graphics control extension.
pub fn is_animated(data: &[u8]) -> bool {
    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return scan::contains_pattern(b"ANIM", &data[12..]);
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return scan::contains_pattern(GIF_NETSCAPE, data)
            || scan::count_pattern(GIF_GCE, data, 2) > 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn icon(name: &str, source_tags: &[&str]) -> AssetDescriptor {
        let mut d = AssetDescriptor::new("icon", name, "png", "embeded://x.png");
        d.tags = source_tags.iter().map(|t| t.to_string()).collect();
        d
    }

    #[test]
    fn test_main_icon_gets_portrait_override() {
        let tags = derive_tags(&icon("main", &[]), None);
        assert_eq!(tags, vec!["portrait-override"]);
    }

    #[test]
    fn test_main_background() {
        let d = AssetDescriptor::new("background", "main", "png", "");
        assert_eq!(derive_tags(&d, None), vec!["main-background"]);
    }

    #[test]
    fn test_filters_and_dedups() {
        let tags = derive_tags(
            &icon("main", &["actor-1", "nsfw", "portrait-override", "actor-1"]),
            None,
        );
        assert_eq!(tags, vec!["actor-1", "portrait-override"]);
    }

    #[test]
    fn test_animated_webp() {
        let mut webp = b"RIFF\0\0\0\0WEBPVP8X\x0a\0\0\0".to_vec();
        assert!(!is_animated(&webp));
        webp.extend_from_slice(b"ANIM\x06\0\0\0");
        assert!(is_animated(&webp));
    }

    #[test]
    fn test_animated_gif() {
        let mut gif = b"GIF89a\x01\0\x01\0\0\0\0".to_vec();
        gif.extend_from_slice(&[0x21, 0xF9, 0x04, 0, 0, 0, 0, 0]);
        assert!(!is_animated(&gif));
        gif.extend_from_slice(&[0x21, 0xF9, 0x04, 0, 0, 0, 0, 0]);
        assert!(is_animated(&gif));

        let mut looping = b"GIF89a".to_vec();
        looping.extend_from_slice(b"\x21\xFF\x0bNETSCAPE2.0");
        assert!(is_animated(&looping));

        let d = AssetDescriptor::new("emotion", "happy", "gif", "");
        assert_eq!(derive_tags(&d, Some(&looping)), vec!["animated"]);
    }
}
