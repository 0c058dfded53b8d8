//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the aggregator consumes each page.
//!
//! Unlike worker-side hooks, every event here is fired by the single
//! aggregator task, in page order. A callback therefore sees
//! `on_page_complete(7, ..)` only after page 6 has been persisted.
//!
//! # Example
//!
//! ```rust
//! use shot2sheet::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RecordCounter {
//!     records: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for RecordCounter {
//!     fn on_page_complete(&self, index: usize, total: usize, records: usize) {
//!         self.records.fetch_add(records, Ordering::SeqCst);
//!         eprintln!("page {index}/{total}: {records} rows");
//!     }
//! }
//!
//! let counter = Arc::new(RecordCounter { records: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the aggregator as it consumes each page result.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after checkpoint resolution, before any dispatch.
    ///
    /// # Arguments
    /// * `total_pages` — every screenshot found in the input directory
    /// * `skipped`     — leading pages already present in the store
    fn on_run_start(&self, total_pages: usize, skipped: usize) {
        let _ = (total_pages, skipped);
    }

    /// Called instead of every other event when the input directory holds no
    /// screenshots. The store is left as it was.
    fn on_no_work(&self, screenshots_dir: &Path) {
        let _ = screenshots_dir;
    }

    /// Called when a page yielded records (before they are persisted).
    ///
    /// # Arguments
    /// * `index`   — 1-based page position in the full input set
    /// * `total`   — every screenshot found in the input directory
    /// * `records` — rows extracted from this page
    fn on_page_complete(&self, index: usize, total: usize, records: usize) {
        let _ = (index, total, records);
    }

    /// Called when a page failed and contributes zero records.
    fn on_page_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after the last page has been consumed.
    ///
    /// # Arguments
    /// * `total_records` — length of the in-memory store at the end of the run
    fn on_run_complete(&self, total_records: usize) {
        let _ = total_records;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
