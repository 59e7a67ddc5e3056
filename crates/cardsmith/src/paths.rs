//! Archive member naming.
//!
//! Asset names, types and extensions come from untrusted records and end up
//! as archive paths, so every segment is reduced to a safe form first.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Extension used when the declared one is unusable.
pub const FALLBACK_EXT: &str = "bin";

const MAX_EXT_LEN: usize = 8;
const MAX_SEGMENT_LEN: usize = 96;

/// Sanitize a file extension.
///
/// Accepts 1 to 8 ASCII alphanumerics (after dropping one leading dot),
/// lower-cased. Anything else, including separators and `..`, yields
/// `None`.
pub fn sanitize_ext(ext: &str) -> Option<String> {
    let ext = ext.strip_prefix('.').unwrap_or(ext);
    let ok = (1..=MAX_EXT_LEN).contains(&ext.len()) && ext.bytes().all(|b| b.is_ascii_alphanumeric());
    ok.then(|| ext.to_ascii_lowercase())
}

/// Sanitized extension, falling back to the MIME type's conventional one and
/// then to [`FALLBACK_EXT`].
pub fn safe_ext(ext: &str, mimetype: &str) -> String {
    sanitize_ext(ext)
        .or_else(|| cardsmith_common::mime::extension_for(mimetype).map(str::to_owned))
        .unwrap_or_else(|| {
            tracing::debug!(ext, mimetype, "unusable extension, using fallback");
            FALLBACK_EXT.to_owned()
        })
}

/// Reduce a name or type to a single safe path segment.
///
/// Path separators, control characters and characters reserved on common
/// filesystems become `_`; leading dots are stripped so `..` cannot survive.
pub fn sanitize_segment(segment: &str, fallback: &str) -> String {
    let cleaned: String = segment
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim_end_matches([' ', '.']);
    let cleaned: String = cleaned.chars().take(MAX_SEGMENT_LEN).collect();

    if cleaned.is_empty() {
        fallback.to_owned()
    } else {
        cleaned
    }
}

/// CHARX member path for an asset. `ext` must already be sanitized.
///
/// The main icon always lands at `icon/main.<ext>`; everything else at
/// `<type>/<name>.<ext>`.
pub fn charx_member(kind: &str, name: &str, ext: &str, is_main: bool) -> String {
    if is_main {
        return format!("icon/main.{ext}");
    }
    format!(
        "{}/{}.{ext}",
        sanitize_segment(&kind.to_lowercase(), "other"),
        sanitize_segment(name, "asset")
    )
}

/// Append `_<n>` before the extension until `path` is unused.
pub fn unique_member(used: &mut HashSet<String>, path: String) -> String {
    if used.insert(path.clone()) {
        return path;
    }
    let (stem, ext) = path.rsplit_once('.').unwrap_or((path.as_str(), ""));
    let unique = (2..)
        .map(|n| format!("{stem}_{n}.{ext}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| path.clone());
    used.insert(unique.clone());
    unique
}

/// Matches `embeded://<path>` (either spelling) inside record text.
pub fn embedded_ref_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"(embedd?ed://)([^"\\\s<>']+)"#).ok())
        .as_ref()
}

/// Point `embeded://` references at moved members, in one pass.
///
/// `moves` maps old member paths to new ones; unknown paths are left as is.
pub fn rewrite_embedded_refs<'t>(text: &'t str, moves: &HashMap<String, String>) -> Cow<'t, str> {
    let Some(pattern) = embedded_ref_pattern() else {
        return Cow::Borrowed(text);
    };
    pattern.replace_all(text, |caps: &Captures<'_>| match moves.get(&caps[2]) {
        Some(new) => format!("{}{new}", &caps[1]),
        None => caps[0].to_owned(),
    })
}

/// Output file name for a card.
pub fn card_filename(name: &str, ext: &str) -> String {
    format!("{}.{ext}", sanitize_segment(name, "card"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_ext() {
        assert_eq!(sanitize_ext("PNG").as_deref(), Some("png"));
        assert_eq!(sanitize_ext(".webp").as_deref(), Some("webp"));
        assert_eq!(sanitize_ext("../../x"), None);
        assert_eq!(sanitize_ext("p/ng"), None);
        assert_eq!(sanitize_ext(""), None);
        assert_eq!(sanitize_ext("abcdefghi"), None);
    }

    #[test]
    fn test_safe_ext_fallbacks() {
        assert_eq!(safe_ext("../evil", "image/png"), "png");
        assert_eq!(safe_ext("../evil", "application/x-unknown"), "bin");
        assert_eq!(safe_ext("jpg", "image/png"), "jpg");
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("../../etc/passwd", "x"), "_.._etc_passwd");
        assert_eq!(sanitize_segment("..", "x"), "x");
        assert_eq!(sanitize_segment("  happy  ", "x"), "happy");
        assert_eq!(sanitize_segment("a\\b", "x"), "a_b");
        assert_eq!(card_filename("Ava: the Brave", "png"), "Ava_ the Brave.png");
    }

    #[test]
    fn test_charx_member() {
        assert_eq!(charx_member("icon", "front", "png", true), "icon/main.png");
        assert_eq!(charx_member("Emotion", "happy", "webp", false), "emotion/happy.webp");
        assert_eq!(charx_member("../x", "../../y", "png", false), "_x/_.._y.png");
    }

    #[test]
    fn test_unique_member() {
        let mut used = HashSet::new();
        assert_eq!(unique_member(&mut used, "icon/a.png".into()), "icon/a.png");
        assert_eq!(unique_member(&mut used, "icon/a.png".into()), "icon/a_2.png");
        assert_eq!(unique_member(&mut used, "icon/a.png".into()), "icon/a_3.png");
    }

    #[test]
    fn test_rewrite_embedded_refs() {
        let moves = HashMap::from([
            ("assets/emotion/happy.png".to_owned(), "emotion/happy.png".to_owned()),
            ("icon/x.png".to_owned(), "icon/main.png".to_owned()),
            ("icon/main.png".to_owned(), "icon/main_2.png".to_owned()),
        ]);
        let text = r#"<img src="embeded://assets/emotion/happy.png"> embedded://icon/x.png embeded://icon/main.png embeded://other/y.png"#;
        assert_eq!(
            rewrite_embedded_refs(text, &moves),
            r#"<img src="embeded://emotion/happy.png"> embedded://icon/main.png embeded://icon/main_2.png embeded://other/y.png"#
        );
        assert!(matches!(rewrite_embedded_refs("plain text", &moves), Cow::Borrowed(_)));
    }
}
