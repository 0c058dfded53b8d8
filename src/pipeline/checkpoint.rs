//! Checkpoint resolution: decide where an interrupted run resumes.
//!
//! Resume is pure arithmetic over the store length. With page width `W` and
//! `n` stored records, `n mod W` trailing records are treated as a partial
//! page from an interrupted run and dropped, and `n div W` leading
//! screenshots are skipped.
//!
//! This silently misaligns if any page ever yields a count other than `W`.
//! A short final page (fewer rows than `W` on the last screenshot) is
//! dropped and re-extracted on every run, then dropped again on the next.

use crate::output::{ExtractionRecord, ImagePage};
use crate::pipeline::store;
use std::path::Path;
use tracing::{info, warn};

/// Outcome of checkpoint arithmetic over a store of `n` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// Complete pages already in the store (`n div W`).
    pub pages_done: usize,
    /// Trailing records of an incomplete page (`n mod W`).
    pub remainder: usize,
}

impl Checkpoint {
    /// Compute the checkpoint for `record_count` records at `page_width`.
    ///
    /// `page_width` must be non-zero; [`crate::ExtractionConfig`] enforces it.
    pub fn compute(record_count: usize, page_width: usize) -> Self {
        Self {
            pages_done: record_count / page_width,
            remainder: record_count % page_width,
        }
    }
}

/// Store state after resolution, ready for dispatch.
#[derive(Debug)]
pub struct ResolvedStore {
    /// Page-aligned records (`len mod W == 0`).
    pub records: Vec<ExtractionRecord>,
    pub checkpoint: Checkpoint,
    /// Whether the truncated store was written back successfully. `None`
    /// when no truncation was needed.
    pub truncation_persisted: Option<bool>,
}

/// Load the store, drop a trailing partial page, and persist the truncation
/// before any new work starts.
pub async fn resolve(store_path: &Path, page_width: usize) -> ResolvedStore {
    let mut records = store::load_store(store_path).await;
    let checkpoint = Checkpoint::compute(records.len(), page_width);

    let truncation_persisted = if checkpoint.remainder > 0 {
        records.truncate(records.len() - checkpoint.remainder);
        info!(
            "Dropped {} records of an incomplete trailing page",
            checkpoint.remainder
        );
        match store::persist_store(store_path, &records).await {
            Ok(()) => Some(true),
            Err(e) => {
                warn!("Error saving cleaned data to {}: {}", store_path.display(), e);
                Some(false)
            }
        }
    } else {
        None
    };

    ResolvedStore {
        records,
        checkpoint,
        truncation_persisted,
    }
}

/// Drop the first `pages_done` pages; all of them if the store covers more.
pub fn skip_completed(pages: Vec<ImagePage>, pages_done: usize) -> Vec<ImagePage> {
    if pages_done >= pages.len() {
        return Vec::new();
    }
    pages.into_iter().skip(pages_done).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn records(n: usize) -> Vec<ExtractionRecord> {
        (0..n)
            .map(|i| ExtractionRecord {
                name: format!("row {i}"),
                ..Default::default()
            })
            .collect()
    }

    fn pages(n: usize) -> Vec<ImagePage> {
        (0..n)
            .map(|index| ImagePage {
                path: PathBuf::from(format!("p{index:03}.png")),
                index,
            })
            .collect()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(
            Checkpoint::compute(0, 19),
            Checkpoint { pages_done: 0, remainder: 0 }
        );
        assert_eq!(
            Checkpoint::compute(45, 19),
            Checkpoint { pages_done: 2, remainder: 7 }
        );
        assert_eq!(
            Checkpoint::compute(38, 19),
            Checkpoint { pages_done: 2, remainder: 0 }
        );
    }

    #[tokio::test]
    async fn partial_page_is_truncated_and_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.json");
        store::persist_store(&path, &records(2 * 5 + 3)).await.unwrap();

        let resolved = resolve(&path, 5).await;
        assert_eq!(resolved.records.len(), 10);
        assert_eq!(resolved.checkpoint.pages_done, 2);
        assert_eq!(resolved.truncation_persisted, Some(true));
        assert_eq!(resolved.records.last().unwrap().name, "row 9");

        let on_disk = store::load_store(&path).await;
        assert_eq!(on_disk.len(), 10);
    }

    #[tokio::test]
    async fn aligned_store_is_not_rewritten() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.json");
        store::persist_store(&path, &records(10)).await.unwrap();
        let before = std::fs::metadata(&path).unwrap().modified().unwrap();

        let resolved = resolve(&path, 5).await;
        assert_eq!(resolved.truncation_persisted, None);
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn skip_leading_pages() {
        let rest = skip_completed(pages(5), 2);
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].index, 2);

        assert!(skip_completed(pages(3), 3).is_empty());
        assert!(skip_completed(pages(3), 9).is_empty());
        assert_eq!(skip_completed(pages(3), 0).len(), 3);
    }
}
