//! Resumable extraction runs: checkpoint, dispatch, aggregate, persist.
//!
//! ## Why persist after every page?
//!
//! A run over a few hundred screenshots takes minutes and may be killed at
//! any point. Rewriting the store after each non-empty page keeps the file a
//! page-ordered prefix of the final result, so the next run can resume from
//! its length alone. Only the aggregator task writes the store; workers never
//! touch it.

use crate::client::InferenceClient;
use crate::config::ExtractionConfig;
use crate::error::Shot2SheetError;
use crate::output::RunStats;
use crate::pipeline::{checkpoint, enumerate, store};
use crate::stream::dispatch;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Extract every screenshot not yet covered by the store.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(RunStats)` even when individual pages failed (see
/// `stats.failed_pages`); a failed page simply contributes no records and
/// will be picked up again on a later run once the checkpoint reaches it.
///
/// # Errors
/// Only when the screenshot pattern built from the directory and extension
/// is unusable. Store write failures are counted in
/// `stats.persist_failures`, never returned.
pub async fn run_extraction(
    client: Arc<dyn InferenceClient>,
    config: &ExtractionConfig,
) -> Result<RunStats, Shot2SheetError> {
    let total_start = Instant::now();
    let store_path = config.store_path.as_path();
    let mut stats = RunStats::default();
    info!(
        "Starting extraction: {} → {} ({})",
        config.screenshots_dir.display(),
        store_path.display(),
        client.name()
    );

    // ── Step 1: Make sure a store exists ─────────────────────────────────
    // A store that cannot be created is reported; the run continues in
    // memory and every later persist will report its own failure.
    if let Err(e) = store::ensure_store(store_path).await {
        error!("Error initialising store {}: {}", store_path.display(), e);
        stats.persist_failures += 1;
    }

    // ── Step 2: Enumerate screenshots ────────────────────────────────────
    let pages = enumerate::enumerate_pages(&config.screenshots_dir, &config.extension)?;
    let total = pages.len();
    stats.total_pages = total;
    if pages.is_empty() {
        info!("No screenshots found in {}", config.screenshots_dir.display());
        if let Some(ref cb) = config.progress_callback {
            cb.on_no_work(&config.screenshots_dir);
        }
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        return Ok(stats);
    }
    info!("Found {} screenshots to process", total);

    // ── Step 3: Resolve checkpoint ───────────────────────────────────────
    let resolved = checkpoint::resolve(store_path, config.page_width).await;
    let mut records = resolved.records;
    stats.truncated_records = resolved.checkpoint.remainder;
    if resolved.truncation_persisted == Some(false) {
        stats.persist_failures += 1;
    }

    let remaining = checkpoint::skip_completed(pages, resolved.checkpoint.pages_done);
    stats.skipped_pages = total - remaining.len();
    info!(
        "{} records already stored; skipping {} of {} screenshots",
        records.len(),
        stats.skipped_pages,
        total
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total, stats.skipped_pages);
    }

    // ── Step 4: Dispatch and aggregate in page order ─────────────────────
    let mut results = dispatch(
        Arc::clone(&client),
        Arc::new(config.clone()),
        remaining,
        total,
    );

    while let Some(page) = results.next().await {
        if let Some(ref err) = page.error {
            stats.failed_pages += 1;
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_error(page.index, total, &err.to_string());
            }
            continue;
        }

        if page.records.is_empty() {
            debug!("[{}/{}] no records", page.index, total);
            stats.failed_pages += 1;
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_complete(page.index, total, 0);
            }
            continue;
        }

        let count = page.records.len();
        if count != config.page_width {
            warn!(
                "[{}/{}] yielded {} records, expected {}; resume offsets may drift",
                page.index, total, count, config.page_width
            );
        }
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_complete(page.index, total, count);
        }

        records.extend(page.records);
        stats.processed_pages += 1;
        stats.new_records += count;

        match store::persist_store(store_path, &records).await {
            Ok(()) => info!("[{}/{}] Added {} records. Total: {}", page.index, total, count, records.len()),
            Err(e) => {
                stats.persist_failures += 1;
                error!("Error saving data to {}: {}", store_path.display(), e);
            }
        }
    }

    // ── Step 5: Summarise ────────────────────────────────────────────────
    stats.total_records = records.len();
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(stats.total_records);
    }
    info!(
        "DONE! Final data count: {} ({} new, {} failed pages, {}ms)",
        stats.total_records, stats.new_records, stats.failed_pages, stats.total_duration_ms
    );

    Ok(stats)
}

/// Synchronous wrapper around [`run_extraction`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_extraction_sync(
    client: Arc<dyn InferenceClient>,
    config: &ExtractionConfig,
) -> Result<RunStats, Shot2SheetError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Shot2SheetError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run_extraction(client, config))
}
