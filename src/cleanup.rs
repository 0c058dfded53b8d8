//! Remote cleanup: delete every file the inference backend still holds.
//!
//! Extraction deletes each upload on its own, but a killed run leaves its
//! in-flight uploads behind. Gemini expires files after 48 hours; this clears
//! them immediately.

use crate::client::InferenceClient;
use crate::error::Shot2SheetError;
use serde::Serialize;
use tracing::{info, warn};

/// What a purge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeStats {
    pub found: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// List every remote file and delete each one.
///
/// # Errors
/// Only when listing fails. A file that cannot be deleted is logged and
/// counted in `failed`; the purge moves on to the next one.
pub async fn purge_remote_files(client: &dyn InferenceClient) -> Result<PurgeStats, Shot2SheetError> {
    info!("Listing files on {} for deletion...", client.name());
    let files = client.list().await?;

    let mut stats = PurgeStats {
        found: files.len(),
        ..Default::default()
    };
    if files.is_empty() {
        info!("No files found to delete.");
        return Ok(stats);
    }
    info!("Found {} files. Starting deletion...", files.len());

    for file in &files {
        let label = file.display_name.as_deref().unwrap_or("-");
        match client.delete(file).await {
            Ok(()) => {
                info!("Deleted {} ({})", file.name, label);
                stats.deleted += 1;
            }
            Err(e) => {
                warn!("Could not delete {} ({}): {}", file.name, label, e);
                stats.failed += 1;
            }
        }
    }

    info!("Purge complete: {} deleted, {} failed", stats.deleted, stats.failed);
    Ok(stats)
}
