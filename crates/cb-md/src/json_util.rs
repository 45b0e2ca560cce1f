//! Shared JSON parsing helpers used by the provider adapters.
//!
//! Eastmoney encodes numbers as JSON numbers when `fltt=2`, but any field the
//! exchange has no value for comes back as the string `"-"`. Historical rows
//! are comma-joined strings. These helpers fold both shapes into the record
//! defaults: NaN for floats, 0 for integers.

use anyhow::Result;
use cb_core::error::FeedError;
use serde_json::Value;

/// Parse a JSON value (string or number) as `f64`.
///
/// Non-numeric strings (placeholders) yield `None`.
#[inline]
pub fn parse_str_f64(v: Option<&Value>) -> Option<f64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        fast_float2::parse(s.trim()).ok()
    } else {
        v.as_f64()
    }
}

/// Parse a JSON value (string or number) as `i64`, accepting integral floats.
#[inline]
pub fn parse_str_i64(v: Option<&Value>) -> Option<i64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        cell_i64_opt(s)
    } else {
        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
    }
}

/// Float field, NaN when missing or a placeholder.
#[inline]
pub fn f64_or_nan(v: &Value, key: &str) -> f64 {
    parse_str_f64(v.get(key)).unwrap_or(f64::NAN)
}

/// Integer field, 0 when missing or a placeholder.
#[inline]
pub fn i64_or_zero(v: &Value, key: &str) -> i64 {
    parse_str_i64(v.get(key)).unwrap_or(0)
}

/// String field; numbers are rendered, anything else is empty.
pub fn str_field(v: &Value, key: &str) -> String {
    match v.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// One cell of a comma-joined row as `f64`, NaN on failure.
#[inline]
pub fn cell_f64(s: &str) -> f64 {
    fast_float2::parse(s.trim()).unwrap_or(f64::NAN)
}

fn cell_i64_opt(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>().ok().or_else(|| fast_float2::parse::<f64, _>(s).ok().map(|f| f as i64))
}

/// One cell of a comma-joined row as `i64`, 0 on failure.
#[inline]
pub fn cell_i64(s: &str) -> i64 {
    cell_i64_opt(s).unwrap_or(0)
}

/// The string rows of array field `key`. A missing or null array is an empty
/// list; non-string elements are a parse error.
pub fn string_rows<'a>(data: &'a Value, key: &str) -> Result<Vec<&'a str>> {
    let Some(arr) = data.get(key).and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    arr.iter()
        .map(|row| {
            row.as_str()
                .ok_or_else(|| anyhow::Error::from(FeedError::Parse(format!("{key}: non-string row {row}"))))
        })
        .collect()
}

/// Append `:00` to `YYYY-MM-DD HH:MM` timestamps.
pub fn with_seconds(ts: &str) -> String {
    if ts.len() == 16 { format!("{ts}:00") } else { ts.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn placeholders_map_to_defaults() {
        let v = json!({ "f43": 120.5, "f44": "-", "f47": 3000, "f48": "-", "f49": "12.0" });
        assert_eq!(f64_or_nan(&v, "f43"), 120.5);
        assert!(f64_or_nan(&v, "f44").is_nan());
        assert!(f64_or_nan(&v, "missing").is_nan());
        assert_eq!(i64_or_zero(&v, "f47"), 3000);
        assert_eq!(i64_or_zero(&v, "f48"), 0);
        assert_eq!(i64_or_zero(&v, "f49"), 12);
    }

    #[test]
    fn cells_and_rows() {
        assert_eq!(cell_f64("1.25"), 1.25);
        assert!(cell_f64("-").is_nan());
        assert_eq!(cell_i64("42"), 42);
        assert_eq!(cell_i64(""), 0);
        let v = json!({ "klines": ["a,b", "c,d"], "bad": [1] });
        assert_eq!(string_rows(&v, "klines").unwrap(), vec!["a,b", "c,d"]);
        assert!(string_rows(&v, "none").unwrap().is_empty());
        assert!(string_rows(&v, "bad").is_err());
    }

    #[test]
    fn seconds_appended_once() {
        assert_eq!(with_seconds("2022-09-01 09:31"), "2022-09-01 09:31:00");
        assert_eq!(with_seconds("2022-09-01 09:31:00"), "2022-09-01 09:31:00");
        assert_eq!(with_seconds("2022-09-01"), "2022-09-01");
    }
}
