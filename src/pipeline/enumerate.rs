//! Work enumeration: list the screenshots of one run in page order.
//!
//! File-name order is the only source of page order. Callers must name
//! screenshots so that lexicographic order equals table order
//! (`page_001.png`, `page_002.png`, …, never `page_1.png` next to `page_10.png`).

use crate::error::Shot2SheetError;
use crate::output::ImagePage;
use glob::{glob_with, MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// List every `*.{extension}` file in `dir`, sorted by file name.
///
/// The extension match is case-insensitive. A missing directory yields an
/// empty list rather than an error: "no screenshots" is the same
/// non-fatal condition either way.
pub fn enumerate_pages(dir: &Path, extension: &str) -> Result<Vec<ImagePage>, Shot2SheetError> {
    if !dir.is_dir() {
        warn!("Screenshot directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let pattern = build_pattern(dir, extension);
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let entries = glob_with(&pattern, options).map_err(|e| Shot2SheetError::InvalidPattern {
        pattern: pattern.clone(),
        detail: e.to_string(),
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!("Found {} screenshots matching {}", paths.len(), pattern);

    Ok(paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| ImagePage { path, index })
        .collect())
}

/// Directory part is escaped so `[` or `*` in a real path are literal.
fn build_pattern(dir: &Path, extension: &str) -> String {
    let escaped_dir = Pattern::escape(&dir.to_string_lossy());
    let escaped_ext = Pattern::escape(extension);
    format!("{}/*.{}", escaped_dir.trim_end_matches('/'), escaped_ext)
}
