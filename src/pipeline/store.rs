//! Record store persistence: one JSON array, rewritten whole after each page.
//!
//! There is no journal and no temp-file rename. A write replaces the file
//! contents in place; a crash in the middle of a write can leave a truncated
//! file, which the next load treats as an empty store.

use crate::output::ExtractionRecord;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Load the store, treating a missing, unreadable or non-array file as empty.
pub async fn load_store(path: &Path) -> Vec<ExtractionRecord> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No store at {}, starting empty", path.display());
            return Vec::new();
        }
        Err(e) => {
            warn!("Could not read store {}: {} (starting empty)", path.display(), e);
            return Vec::new();
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Array(items)) => {
            let found = items.len();
            let records: Vec<ExtractionRecord> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(_) => serde_json::from_value(item).ok(),
                    _ => None,
                })
                .collect();
            if records.len() < found {
                // The next persist rewrites the file without them.
                warn!(
                    "Store {} has {} non-record entries; they are dropped and resume counts \
                     the remaining {} records only",
                    path.display(),
                    found - records.len(),
                    records.len()
                );
            }
            records
        }
        Ok(_) => {
            warn!("Store {} is not a JSON array (starting empty)", path.display());
            Vec::new()
        }
        Err(e) => {
            warn!("Store {} is not valid JSON: {} (starting empty)", path.display(), e);
            Vec::new()
        }
    }
}

/// Overwrite the store with `records`, pretty-printed with 4-space indent.
///
/// Non-ASCII text is written as UTF-8, not `\u` escapes. The parent
/// directory is created if needed.
pub async fn persist_store(path: &Path, records: &[ExtractionRecord]) -> io::Result<()> {
    let bytes = to_pretty_json(records)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, bytes).await?;
    debug!("Persisted {} records to {}", records.len(), path.display());
    Ok(())
}

/// Create an empty store (`[]`) if no file exists yet. Existing files are
/// left untouched.
pub async fn ensure_store(path: &Path) -> io::Result<()> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    persist_store(path, &[]).await
}

fn to_pretty_json(records: &[ExtractionRecord]) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(records.len() * 256 + 2);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    records.serialize(&mut ser).map_err(io::Error::other)?;
    Ok(buf)
}
