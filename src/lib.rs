//! # shot2sheet
//!
//! Extract tables from paginated screenshots with a Vision Language Model,
//! keep the rows in a resumable JSON store, and export them to `.xlsx`.
//!
//! ## Why this crate?
//!
//! Some web tables cannot be exported, only scrolled and screenshotted. A
//! VLM reads each screenshot as a person would and answers with JSON rows.
//! Hundreds of pages take minutes and cost money, so a run must survive
//! being killed: every finished page is persisted immediately, and the next
//! run resumes after the last complete page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Screenshots/*.png
//!  │
//!  ├─ 1. Enumerate   glob + sort by file name (= page order)
//!  ├─ 2. Checkpoint  drop a partial trailing page, skip finished pages
//!  ├─ 3. Extract     upload → infer → delete, up to 100 pages at once
//!  ├─ 4. Parse       fences, {"data": [...]}, truncated header keys
//!  ├─ 5. Persist     rewrite data.json after every page, in page order
//!  └─ 6. Export      data.json → data.xlsx
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shot2sheet::{export_to_xlsx, run_extraction, ExtractionConfig, GeminiClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::default();
//!     // Reads GEMINI_API_KEY (or GOOGLE_API_KEY).
//!     let client = Arc::new(GeminiClient::from_env(&config)?);
//!     let stats = run_extraction(client, &config).await?;
//!     eprintln!("{} records ({} new)", stats.total_records, stats.new_records);
//!     export_to_xlsx(&config.store_path, "data.xlsx")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `shot2sheet` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! shot2sheet = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cleanup;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cleanup::{purge_remote_files, PurgeStats};
pub use client::{GeminiClient, InferenceClient, ProviderClient, RemoteFile};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, DEFAULT_PAGE_WIDTH};
pub use error::{ClientError, PageError, Shot2SheetError};
pub use export::{export_to_xlsx, ExportStats};
pub use output::{ExtractionRecord, ImagePage, PageResult, RunStats, CANONICAL_KEYS};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use run::{run_extraction, run_extraction_sync};
pub use stream::{dispatch, PageStream};
