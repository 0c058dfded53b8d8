//! Output types: extracted records, per-page results and run statistics.

use crate::error::PageError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Header keys every record carries, in spreadsheet column order.
///
/// Three of them are truncated exactly the way the source table truncates its
/// headers. They are part of the contract, not typos.
pub const CANONICAL_KEYS: [&str; 8] = [
    "NAME",
    "EMAIL",
    "PHONE NUMBER",
    "CONTACT -> DEALS",
    "LAST ACTIVITY DATE (G...",
    "NUMBER OF CLOSED WO...",
    "AREA OF ACTIVITY",
    "AREA LABA",
];

/// One table row with exactly the canonical keys.
///
/// Missing values are the empty string. Deserialisation accepts any JSON
/// scalar per field so a hand-edited store with `"NUMBER OF CLOSED WO...": 3`
/// still loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    #[serde(rename = "NAME", default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "EMAIL", default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(rename = "PHONE NUMBER", default, deserialize_with = "lenient_string")]
    pub phone: String,
    #[serde(rename = "CONTACT -> DEALS", default, deserialize_with = "lenient_string")]
    pub deals: String,
    #[serde(
        rename = "LAST ACTIVITY DATE (G...",
        default,
        deserialize_with = "lenient_string"
    )]
    pub last_activity: String,
    #[serde(
        rename = "NUMBER OF CLOSED WO...",
        default,
        deserialize_with = "lenient_string"
    )]
    pub closed_work: String,
    #[serde(rename = "AREA OF ACTIVITY", default, deserialize_with = "lenient_string")]
    pub activity_area: String,
    #[serde(rename = "AREA LABA", default, deserialize_with = "lenient_string")]
    pub profit_area: String,
}

impl ExtractionRecord {
    /// Build a record from a JSON object whose keys are already canonical.
    ///
    /// Unknown keys are ignored; absent keys become `""`.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let field = |key: &str| object.get(key).map(value_to_string).unwrap_or_default();
        Self {
            name: field(CANONICAL_KEYS[0]),
            email: field(CANONICAL_KEYS[1]),
            phone: field(CANONICAL_KEYS[2]),
            deals: field(CANONICAL_KEYS[3]),
            last_activity: field(CANONICAL_KEYS[4]),
            closed_work: field(CANONICAL_KEYS[5]),
            activity_area: field(CANONICAL_KEYS[6]),
            profit_area: field(CANONICAL_KEYS[7]),
        }
    }

    /// Value stored under a canonical key, or `None` for any other key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields()
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// `(key, value)` pairs in canonical column order.
    pub fn fields(&self) -> [(&'static str, &str); 8] {
        [
            (CANONICAL_KEYS[0], self.name.as_str()),
            (CANONICAL_KEYS[1], self.email.as_str()),
            (CANONICAL_KEYS[2], self.phone.as_str()),
            (CANONICAL_KEYS[3], self.deals.as_str()),
            (CANONICAL_KEYS[4], self.last_activity.as_str()),
            (CANONICAL_KEYS[5], self.closed_work.as_str()),
            (CANONICAL_KEYS[6], self.activity_area.as_str()),
            (CANONICAL_KEYS[7], self.profit_area.as_str()),
        ]
    }
}

/// String rendering of a JSON value for a record cell.
///
/// Strings verbatim, `null` as empty, everything else as its JSON text.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_string(&value))
}

/// One screenshot page discovered by the enumerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePage {
    pub path: PathBuf,
    /// 0-based position in lexicographic file-name order.
    pub index: usize,
}

impl ImagePage {
    /// File name for log lines; falls back to the full path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// 1-based position, as shown in progress output.
    pub fn display_index(&self) -> usize {
        self.index + 1
    }
}

/// Result of extracting a single page.
#[derive(Debug, Clone)]
pub struct PageResult {
    /// 1-based page position in the full input set.
    pub index: usize,
    pub records: Vec<ExtractionRecord>,
    pub duration_ms: u64,
    /// `Some` when the page failed; `records` is then empty.
    pub error: Option<PageError>,
}

/// Summary of a finished extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Screenshots found in the input directory.
    pub total_pages: usize,
    /// Leading pages skipped because the store already covered them.
    pub skipped_pages: usize,
    /// Records dropped from the store tail during checkpoint resolution.
    pub truncated_records: usize,
    /// Pages dispatched this run that yielded at least one record.
    pub processed_pages: usize,
    /// Pages dispatched this run that yielded nothing.
    pub failed_pages: usize,
    /// Records appended this run.
    pub new_records: usize,
    /// Store length at the end of the run.
    pub total_records: usize,
    /// Store writes that failed (state kept in memory).
    pub persist_failures: usize,
    pub total_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialises_exactly_the_canonical_keys_in_order() {
        let rec = ExtractionRecord {
            name: "Ana".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&rec).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, CANONICAL_KEYS);
        assert_eq!(value["NAME"], "Ana");
        assert_eq!(value["EMAIL"], "");
    }

    #[test]
    fn lenient_fields_accept_scalars() {
        let rec: ExtractionRecord = serde_json::from_value(json!({
            "NAME": "Bo",
            "NUMBER OF CLOSED WO...": 3,
            "EMAIL": null,
            "unrelated": "x"
        }))
        .unwrap();
        assert_eq!(rec.closed_work, "3");
        assert_eq!(rec.email, "");
        assert_eq!(rec.phone, "");
    }

    #[test]
    fn get_by_canonical_key() {
        let rec = ExtractionRecord {
            profit_area: "North".into(),
            ..Default::default()
        };
        assert_eq!(rec.get("AREA LABA"), Some("North"));
        assert_eq!(rec.get("NOPE"), None);
    }

    #[test]
    fn page_file_name_and_display_index() {
        let page = ImagePage {
            path: PathBuf::from("/tmp/shots/page_003.png"),
            index: 2,
        };
        assert_eq!(page.file_name(), "page_003.png");
        assert_eq!(page.display_index(), 3);
    }
}
