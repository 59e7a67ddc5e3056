//! Lenient field deserializers.
//!
//! Cards in the wild are written by many tools; `null` where a string is
//! expected, numbers as strings and single strings where an array belongs
//! are all common. These helpers accept such values instead of failing the
//! whole record.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// String field: `null` becomes empty, scalars are stringified.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    })
}

/// Optional string field: `null` and empty strings become `None`.
pub fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = lenient_string(deserializer)?;
    Ok((!s.is_empty()).then_some(s))
}

/// String list: `null` becomes empty, a lone string becomes a one-element
/// list, non-string elements are stringified.
pub fn lenient_string_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Value::String(s) if !s.is_empty() => vec![s],
        _ => Vec::new(),
    })
}

/// Object field: anything that is not an object becomes an empty map.
pub fn lenient_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

/// Integer field: floats are truncated, numeric strings parsed, anything
/// else is zero.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(as_i64(&Value::deserialize(deserializer)?).unwrap_or(0))
}

/// Optional integer field with the same coercions as [`lenient_i64`].
pub fn lenient_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(as_i64(&Value::deserialize(deserializer)?))
}

/// Boolean field defaulting to `true`: only an explicit `false` disables.
pub fn lenient_bool_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(!matches!(Value::deserialize(deserializer)?, Value::Bool(false)))
}

pub(crate) fn default_true() -> bool {
    true
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "lenient_string")]
        s: String,
        #[serde(default, deserialize_with = "lenient_string_vec")]
        v: Vec<String>,
        #[serde(default, deserialize_with = "lenient_i64")]
        n: i64,
        #[serde(default, deserialize_with = "lenient_map")]
        m: Map<String, Value>,
    }

    #[test]
    fn test_nulls_and_scalars() {
        let p: Probe = serde_json::from_str(r#"{"s":null,"v":null,"n":null,"m":null}"#).unwrap();
        assert_eq!(p.s, "");
        assert!(p.v.is_empty());
        assert_eq!(p.n, 0);
        assert!(p.m.is_empty());

        let p: Probe = serde_json::from_str(r#"{"s":42,"v":"one","n":"7.9","m":[]}"#).unwrap();
        assert_eq!(p.s, "42");
        assert_eq!(p.v, vec!["one"]);
        assert_eq!(p.n, 7);
    }

    #[test]
    fn test_missing_fields_default() {
        let p: Probe = serde_json::from_str("{}").unwrap();
        assert_eq!(p.s, "");
        assert!(p.v.is_empty());
    }
}
