//! Response parsing: turn raw model text into canonical records.
//!
//! Even with a JSON response MIME type and a prompt that forbids it, models
//! sometimes wrap output in a ```` ```json ```` fence, wrap the array in a
//! `{"data": [...]}` envelope, return a lone object for a one-row page, or
//! echo a column header with one dot too few. Each of those is repaired here
//! by a small pure function so the rules can be tested without a model.
//!
//! ## Rule Order
//!
//! 1. Strip the outer fence lines
//! 2. Parse JSON and accept the three known shapes
//! 3. Rename near-miss header keys to their canonical spelling
//! 4. Project each object onto the canonical key set

use crate::output::{ExtractionRecord, CANONICAL_KEYS};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Envelope key some models put around the row array.
const WRAPPER_KEY: &str = "data";

/// Why a response could not be turned into records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// The text is not JSON at all.
    InvalidJson(String),
    /// Valid JSON, but a scalar or an array with no objects in it.
    UnexpectedShape(&'static str),
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseFailure::InvalidJson(detail) => {
                write!(f, "AI output was not valid JSON ({detail})")
            }
            ParseFailure::UnexpectedShape(kind) => {
                write!(f, "Unexpected JSON format ({kind})")
            }
        }
    }
}

/// Parse one model response into canonical records.
pub fn parse_response(raw: &str) -> Result<Vec<ExtractionRecord>, ParseFailure> {
    let text = strip_fences(raw);
    let parsed: Value =
        serde_json::from_str(&text).map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;

    let rows = into_rows(parsed)?;
    let total = rows.len();
    let objects: Vec<Map<String, Value>> = rows
        .into_iter()
        .filter_map(|row| match row {
            Value::Object(map) => Some(map),
            other => {
                debug!("Skipping non-object row: {}", other);
                None
            }
        })
        .collect();

    if total > 0 && objects.is_empty() {
        return Err(ParseFailure::UnexpectedShape("array without objects"));
    }

    Ok(objects
        .iter()
        .map(|obj| ExtractionRecord::from_object(&normalize_keys(obj)))
        .collect())
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────────

/// Remove a leading and a trailing fence line when the text opens with one.
///
/// Only the first and last lines are considered; a fence in the middle of
/// the text is left alone and will fail JSON parsing, as it should.
pub fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines.first().is_some_and(|l| l.starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

// ── Rule 2: Accept known shapes ──────────────────────────────────────────────

fn into_rows(parsed: Value) -> Result<Vec<Value>, ParseFailure> {
    match parsed {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => match map.remove(WRAPPER_KEY) {
            Some(Value::Array(rows)) => Ok(rows),
            Some(other) => {
                // Not an envelope after all; "data" is just a column.
                map.insert(WRAPPER_KEY.to_string(), other);
                Ok(vec![Value::Object(map)])
            }
            None => Ok(vec![Value::Object(map)]),
        },
        Value::Null => Err(ParseFailure::UnexpectedShape("null")),
        Value::Bool(_) => Err(ParseFailure::UnexpectedShape("boolean")),
        Value::Number(_) => Err(ParseFailure::UnexpectedShape("number")),
        Value::String(_) => Err(ParseFailure::UnexpectedShape("string")),
    }
}

// ── Rule 3: Canonical header keys ────────────────────────────────────────────

static RE_TRAILING_ELLIPSIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\.+|…)\s*$").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Upper-cased key with any trailing ellipsis and extra whitespace removed.
fn stem(key: &str) -> String {
    let without_dots = RE_TRAILING_ELLIPSIS.replace(key.trim(), "");
    RE_WHITESPACE
        .replace_all(without_dots.trim(), " ")
        .to_uppercase()
}

fn is_truncated(key: &str) -> bool {
    RE_TRAILING_ELLIPSIS.is_match(key.trim())
}

/// Map a header key to its canonical spelling, if it is a recognisable
/// variant of one.
///
/// Accepted variants, most specific first:
/// * same text up to case, whitespace and trailing dots
///   (`"LAST ACTIVITY DATE (G.."`, `"Email"`)
/// * the full header a truncated canonical key abbreviates
///   (`"NUMBER OF CLOSED WON DEALS"`)
/// * a shorter truncation matching exactly one canonical key
///   (`"LAST ACTIVITY D..."`)
pub fn canonical_key(key: &str) -> Option<&'static str> {
    if let Some(exact) = CANONICAL_KEYS.iter().copied().find(|k| *k == key) {
        return Some(exact);
    }

    let key_stem = stem(key);
    if key_stem.is_empty() {
        return None;
    }

    if let Some(k) = CANONICAL_KEYS.iter().copied().find(|k| stem(k) == key_stem) {
        return Some(k);
    }

    if let Some(k) = CANONICAL_KEYS
        .iter()
        .copied()
        .find(|k| is_truncated(k) && key_stem.starts_with(&stem(k)))
    {
        return Some(k);
    }

    if is_truncated(key) {
        let mut candidates = CANONICAL_KEYS
            .iter()
            .copied()
            .filter(|k| stem(k).starts_with(&key_stem));
        if let (Some(only), None) = (candidates.next(), candidates.next()) {
            return Some(only);
        }
    }

    None
}

/// Rename near-miss keys to their canonical spelling, keeping every value.
///
/// Keys that are already canonical, and keys that match nothing, pass
/// through unchanged. When both a canonical key and a variant of it are
/// present, the canonical one wins.
pub fn normalize_keys(row: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::with_capacity(row.len());

    for (key, value) in row {
        if CANONICAL_KEYS.contains(&key.as_str()) {
            out.insert(key.clone(), value.clone());
        }
    }

    for (key, value) in row {
        if CANONICAL_KEYS.contains(&key.as_str()) {
            continue;
        }
        match canonical_key(key) {
            Some(canonical) if !out.contains_key(canonical) => {
                debug!("Renamed header {:?} to {:?}", key, canonical);
                out.insert(canonical.to_string(), value.clone());
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ROWS: &str = r#"[
        {"NAME": "Ana", "EMAIL": "ana@example.com", "PHONE NUMBER": "+40 700"},
        {"NAME": "Bo", "AREA LABA": "North"}
    ]"#;

    #[test]
    fn test_strip_fences_with_language() {
        let input = format!("```json\n{ROWS}\n```");
        assert_eq!(strip_fences(&input), ROWS.trim());
    }

    #[test]
    fn test_strip_fences_no_lang() {
        assert_eq!(strip_fences("```\n[1]\n```"), "[1]");
    }

    #[test]
    fn test_no_fences_passthrough() {
        assert_eq!(strip_fences("  [1, 2]\n"), "[1, 2]");
    }

    #[test]
    fn fenced_and_bare_parse_identically() {
        let fenced = format!("```json\n{ROWS}\n```");
        assert_eq!(parse_response(&fenced), parse_response(ROWS));
        assert_eq!(parse_response(ROWS).unwrap().len(), 2);
    }

    #[test]
    fn array_of_objects_fills_missing_keys() {
        let records = parse_response(ROWS).unwrap();
        assert_eq!(records[1].name, "Bo");
        assert_eq!(records[1].profit_area, "North");
        assert_eq!(records[1].email, "");
    }

    #[test]
    fn wrapper_object_is_unwrapped() {
        let records = parse_response(r#"{"data": [{"NAME": "a"}, {"NAME": "b"}]}"#).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn single_object_becomes_one_row() {
        let records = parse_response(r#"{"NAME": "solo"}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "solo");
    }

    #[test]
    fn data_column_that_is_not_an_array_stays_a_row() {
        let records = parse_response(r#"{"NAME": "x", "data": "y"}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "x");
    }

    #[test]
    fn non_json_is_rejected() {
        let err = parse_response("Sorry, I cannot read this table.").unwrap_err();
        assert!(matches!(err, ParseFailure::InvalidJson(_)));
        assert!(err.to_string().starts_with("AI output was not valid JSON"));
    }

    #[test]
    fn scalar_shapes_are_rejected() {
        assert_eq!(
            parse_response("42").unwrap_err(),
            ParseFailure::UnexpectedShape("number")
        );
        assert_eq!(
            parse_response("[1, 2]").unwrap_err(),
            ParseFailure::UnexpectedShape("array without objects")
        );
    }

    #[test]
    fn empty_array_is_zero_records_not_an_error() {
        assert!(parse_response("[]").unwrap().is_empty());
    }

    #[test]
    fn truncated_key_is_repaired_and_value_kept() {
        let row = json!({
            "NAME": "Ana",
            "LAST ACTIVITY DATE (G..": "2024-03-01",
            "misc": "left alone"
        });
        let out = normalize_keys(row.as_object().unwrap());
        assert_eq!(out["LAST ACTIVITY DATE (G..."], "2024-03-01");
        assert!(!out.contains_key("LAST ACTIVITY DATE (G.."));
        assert_eq!(out["NAME"], "Ana");
        assert_eq!(out["misc"], "left alone");
    }

    #[test]
    fn canonical_key_variants() {
        assert_eq!(canonical_key("Email"), Some("EMAIL"));
        assert_eq!(canonical_key("NUMBER OF CLOSED WO."), Some("NUMBER OF CLOSED WO..."));
        assert_eq!(
            canonical_key("NUMBER OF CLOSED WON DEALS"),
            Some("NUMBER OF CLOSED WO...")
        );
        assert_eq!(
            canonical_key("LAST ACTIVITY D…"),
            Some("LAST ACTIVITY DATE (G...")
        );
        // "AREA" abbreviates two keys; refuse to guess.
        assert_eq!(canonical_key("AREA..."), None);
        assert_eq!(canonical_key("COMPANY"), None);
    }

    #[test]
    fn canonical_key_wins_over_variant() {
        let row = json!({"EMAIL": "kept@example.com", "email": "dropped@example.com"});
        let out = normalize_keys(row.as_object().unwrap());
        assert_eq!(out["EMAIL"], "kept@example.com");
        assert_eq!(out["email"], "dropped@example.com");
    }
}
