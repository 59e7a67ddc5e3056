//! Card JSON parsing with salvage of damaged files.
//!
//! Accepted shapes:
//!
//! - `{"spec": "chara_card_v2" | "chara_card_v3", "data": {...}}`
//! - a flat V3 object (`spec` present, fields at the top level)
//! - `{"data": {...}}` without `spec` (treated as V2)
//! - legacy V1 objects (`{name, description, ...}`) and the older
//!   `char_name`/`char_persona` field set, both upgraded to V2
//! - a JSON array of any of the above (a collection)
//!
//! When the text is not valid JSON, [`parse_cards`] falls back to a recovery
//! scan that looks for a known anchor and re-parses the nearest enclosing
//! balanced object. This salvages truncated or concatenated files; it is a
//! best-effort heuristic and may pick up the wrong object.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::record::{CardData, CardRecord, SpecVersion};
use crate::{Error, Result};

/// Recovery anchors in priority order.
const ANCHORS: [&str; 3] = [
    r#""spec"\s*:\s*"chara_card_v3""#,
    r#""spec"\s*:\s*"chara_card_v2""#,
    r#""name"\s*:"#,
];

/// Upper bound on candidate substrings tried per anchor.
const MAX_RECOVERY_ATTEMPTS: usize = 16;

/// Field renames applied when upgrading the pre-V2 `char_*` layout.
const LEGACY_FIELDS: [(&str, &str); 5] = [
    ("char_name", "name"),
    ("char_persona", "description"),
    ("world_scenario", "scenario"),
    ("char_greeting", "first_mes"),
    ("example_dialogue", "mes_example"),
];

/// Result of parsing card JSON.
#[derive(Debug, Clone)]
pub struct ParsedCards {
    /// Records in source order.
    pub records: Vec<CardRecord>,
    /// The input was an array.
    pub is_collection: bool,
    /// The records came from the recovery scan rather than a direct parse.
    pub recovered: bool,
    /// Array elements that were not cards.
    pub skipped: usize,
}

/// Parse card JSON text, falling back to the recovery scan.
pub fn parse_cards(text: &str) -> Result<ParsedCards> {
    let text = text.trim_start_matches('\u{feff}');

    match serde_json::from_str::<Value>(text) {
        Ok(value) => from_value(value, false),
        Err(parse_error) => {
            tracing::debug!(error = %parse_error, "direct parse failed, scanning for anchors");
            match recover(text) {
                Some(record) => Ok(ParsedCards {
                    records: vec![record],
                    is_collection: false,
                    recovered: true,
                    skipped: 0,
                }),
                None => Err(Error::Unrecoverable(parse_error.to_string())),
            }
        }
    }
}

/// Parse exactly one card (the first, for collections).
pub fn parse_card(text: &str) -> Result<CardRecord> {
    let parsed = parse_cards(text)?;
    parsed
        .records
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotACard("empty collection".into()))
}

fn from_value(value: Value, recovered: bool) -> Result<ParsedCards> {
    match value {
        Value::Array(items) => {
            let total = items.len();
            let records: Vec<_> = items
                .into_iter()
                .filter_map(|item| match record_from_value(item) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping collection element");
                        None
                    }
                })
                .collect();
            if records.is_empty() {
                return Err(Error::NotACard("array contains no cards".into()));
            }
            Ok(ParsedCards {
                skipped: total - records.len(),
                records,
                is_collection: true,
                recovered,
            })
        }
        other => Ok(ParsedCards {
            records: vec![record_from_value(other)?],
            is_collection: false,
            recovered,
            skipped: 0,
        }),
    }
}

/// Interpret one JSON value as a card record.
pub fn record_from_value(value: Value) -> Result<CardRecord> {
    let Value::Object(mut obj) = value else {
        return Err(Error::NotACard("expected a JSON object".into()));
    };

    let version = obj
        .get("spec")
        .and_then(Value::as_str)
        .and_then(SpecVersion::from_spec);

    let nested = match obj.get("data") {
        Some(Value::Object(inner)) => Some(has_name(inner)),
        _ => None,
    };

    match (version, nested) {
        (Some(version), Some(_)) => {
            let data = obj.remove("data").unwrap_or_default();
            Ok(CardRecord::new(version, card_data(data)?))
        }
        (Some(version), None) => {
            obj.remove("spec");
            obj.remove("spec_version");
            Ok(CardRecord::new(version, card_data(Value::Object(obj))?))
        }
        (None, Some(true)) => {
            let data = obj.remove("data").unwrap_or_default();
            Ok(CardRecord::V2(card_data(data)?))
        }
        (None, _) if has_name(&obj) => {
            for (legacy, modern) in LEGACY_FIELDS {
                if let Some(v) = obj.remove(legacy) {
                    obj.entry(modern).or_insert(v);
                }
            }
            obj.remove("spec");
            obj.remove("spec_version");
            Ok(CardRecord::V2(card_data(Value::Object(obj))?))
        }
        _ => Err(Error::NotACard("no name or spec field".into())),
    }
}

fn has_name(obj: &Map<String, Value>) -> bool {
    obj.contains_key("name") || obj.contains_key("char_name")
}

fn card_data(value: Value) -> Result<CardData> {
    let mut data: CardData = serde_json::from_value(value)?;
    for (i, asset) in data.assets.iter_mut().enumerate() {
        asset.order_index = i;
    }
    Ok(data)
}

fn anchors() -> &'static [Regex] {
    static ANCHOR_RES: OnceLock<Vec<Regex>> = OnceLock::new();
    ANCHOR_RES.get_or_init(|| {
        ANCHORS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

/// Salvage a card from damaged JSON text.
pub fn recover(text: &str) -> Option<CardRecord> {
    for anchor in anchors() {
        let mut attempts = 0;
        for m in anchor.find_iter(text) {
            let Some(stack) = open_braces_at(text.as_bytes(), m.start()) else {
                continue;
            };
            // Innermost enclosing object first, then outward.
            for &open in stack.iter().rev() {
                attempts += 1;
                if attempts > MAX_RECOVERY_ATTEMPTS {
                    break;
                }
                let Some(close) = matching_close(text.as_bytes(), open) else {
                    continue;
                };
                let Ok(value) = serde_json::from_str::<Value>(&text[open..=close]) else {
                    continue;
                };
                if let Ok(record) = record_from_value(value) {
                    tracing::debug!(anchor = anchor.as_str(), offset = open, "recovered card");
                    return Some(record);
                }
            }
            if attempts > MAX_RECOVERY_ATTEMPTS {
                break;
            }
        }
    }
    None
}

/// Offsets of the `{` that are open at `pos`, outermost first.
///
/// Returns `None` when `pos` falls inside a string literal.
fn open_braces_at(bytes: &[u8], pos: usize) -> Option<Vec<usize>> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().take(pos) {
        if in_string {
            match (escaped, b) {
                (true, _) => escaped = false,
                (false, b'\\') => escaped = true,
                (false, b'"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(i),
            b'}' => {
                stack.pop();
            }
            _ => {}
        }
    }

    (!in_string).then_some(stack)
}

/// Offset of the `}` that balances the `{` at `open`.
fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match (escaped, b) {
                (true, _) => escaped = false,
                (false, b'\\') => escaped = true,
                (false, b'"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v3_wrapper() {
        let json = r#"{"spec":"chara_card_v3","spec_version":"3.0","data":{"name":"Ava","assets":[
            {"type":"icon","uri":"ccdefault:","name":"main","ext":"png"},
            {"type":"background","uri":"embeded://bg.png","name":"sunset","ext":"png"}]}}"#;
        let record = parse_card(json).unwrap();
        assert_eq!(record.version(), SpecVersion::V3);
        assert_eq!(record.name(), "Ava");
        assert_eq!(record.assets()[1].order_index, 1);
    }

    #[test]
    fn test_flat_v3() {
        let record = parse_card(r#"{"spec":"chara_card_v3","name":"Flat","tags":["a"]}"#).unwrap();
        assert_eq!(record.version(), SpecVersion::V3);
        assert_eq!(record.data().tags, vec!["a"]);
        assert!(!record.data().extra.contains_key("spec"));
    }

    #[test]
    fn test_v1_and_legacy_upgrade() {
        let v1 = parse_card(r#"{"name":"Old","description":"d","first_mes":"hi"}"#).unwrap();
        assert_eq!(v1.version(), SpecVersion::V2);
        assert_eq!(v1.data().first_mes, "hi");

        let legacy = parse_card(r#"{"char_name":"Py","char_greeting":"hello"}"#).unwrap();
        assert_eq!(legacy.name(), "Py");
        assert_eq!(legacy.data().first_mes, "hello");
    }

    #[test]
    fn test_collection() {
        let parsed = parse_cards(r#"[{"name":"A"},{"nope":1},{"name":"B"}]"#).unwrap();
        assert!(parsed.is_collection);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn test_not_a_card() {
        assert!(matches!(parse_card(r#"{"hello":"world"}"#), Err(Error::NotACard(_))));
        assert!(matches!(parse_card("not json"), Err(Error::Unrecoverable(_))));
    }

    #[test]
    fn test_recover_concatenated() {
        let text = r#"{"spec":"chara_card_v2","data":{"name":"First"}}{"spec":"chara_card_v2","data":{"name":"Second"}}"#;
        let parsed = parse_cards(text).unwrap();
        assert!(parsed.recovered);
        assert_eq!(parsed.records[0].name(), "First");
    }

    #[test]
    fn test_recover_with_braces_in_strings() {
        let text = r#"garbage { "spec" : "chara_card_v3", "data": {"name":"Brace }{ Fan","description":"a \"quoted\" {x}"}} trailing"#;
        let record = recover(text).unwrap();
        assert_eq!(record.name(), "Brace }{ Fan");
        assert_eq!(record.data().description, r#"a "quoted" {x}"#);
    }

    #[test]
    fn test_recover_truncated_wrapper_falls_back_to_name() {
        // Outer wrapper is cut off, but the inner data object is intact.
        let text = r#"{"spec":"chara_card_v2","data":{"name":"Inner","personality":"calm"}, "extra": [1, 2"#;
        let record = recover(text).unwrap();
        assert_eq!(record.name(), "Inner");
        assert_eq!(record.data().personality, "calm");
    }

    #[test]
    fn test_anchor_inside_string_is_ignored() {
        assert!(open_braces_at(br#"{"a":"\"name\":"}"#, 7).is_none());
    }
}
