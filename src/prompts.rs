//! Extraction instruction sent with every screenshot.
//!
//! The prompt names the canonical header keys verbatim, including the
//! truncated ones (`LAST ACTIVITY DATE (G...`). Those truncations are how the
//! source CRM renders its column headers, and the downstream spreadsheet keeps
//! them, so the model is told to reproduce them exactly rather than expand
//! them.
//!
//! Callers can override the default via
//! [`crate::config::ExtractionConfig::system_prompt`].

use crate::output::CANONICAL_KEYS;

/// Default extraction instruction.
///
/// Used when `ExtractionConfig::system_prompt` is `None`.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"Extract all data from the table in this image into a JSON format.

Mandatory Keys (Headers):
Ensure every object in the JSON array has exactly these keys. Map the visible columns in the screenshot to these corresponding keys:
1. "NAME"
2. "EMAIL"
3. "PHONE NUMBER"
4. "CONTACT -> DEALS"
5. "LAST ACTIVITY DATE (G..."
6. "NUMBER OF CLOSED WO..."
7. "AREA OF ACTIVITY"
8. "AREA LABA"

Guidelines:
- Return a list of JSON objects (dictionaries).
- Map the visual columns to the mandatory keys above. Even if the visual header is slightly different or fully written out (e.g., "Last Activity"), map it to the requested key (e.g., "LAST A...").
- If a value is missing or the column is not present, use an empty string "" as the value.
- STRICTLY use the exact key names provided above.
- Provide ONLY the raw JSON output.
- No markdown formatting (no ```json), no explanations, no preamble."#;

/// Resolve the instruction to send: the override if present, else the default.
pub fn extraction_prompt(custom: Option<&str>) -> &str {
    custom.unwrap_or(DEFAULT_EXTRACTION_PROMPT)
}

/// Whether a prompt names every canonical key.
///
/// A custom prompt that forgets a key still works (the normaliser fills it
/// with `""`), but that column would then be empty for the whole run. The
/// CLI warns when this returns false.
pub fn names_all_keys(prompt: &str) -> bool {
    CANONICAL_KEYS
        .iter()
        .all(|key| prompt.contains(&format!("\"{key}\"")))
}
