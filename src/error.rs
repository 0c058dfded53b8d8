//! Error types for the shot2sheet library.
//!
//! Three error types map onto three distinct failure scopes:
//!
//! * [`Shot2SheetError`] — **Fatal** for the operation that returned it:
//!   invalid configuration, a missing export input, a backend that could not
//!   be constructed. Returned as `Err(..)` from the top-level entry points.
//!
//! * [`PageError`] — **Non-fatal**: one screenshot failed (upload error,
//!   model returned prose instead of JSON) but every other page is fine. The
//!   aggregator logs it, counts it, and moves on with zero records for that
//!   page.
//!
//! * [`ClientError`] — a single remote call failed. The extractor folds it
//!   into a [`PageError::Transport`]; the purge utility surfaces it directly.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the shot2sheet library.
#[derive(Debug, Error)]
pub enum Shot2SheetError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The glob pattern built from the directory and extension is invalid.
    #[error("Invalid screenshot pattern '{pattern}': {detail}")]
    InvalidPattern { pattern: String, detail: String },

    // ── Store / export errors ─────────────────────────────────────────────
    /// Export input file was not found.
    #[error("JSON store not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Export input could not be read or parsed as JSON.
    #[error("Failed to read JSON store '{path}': {detail}")]
    InvalidStore { path: PathBuf, detail: String },

    /// Export input is an empty array or not an array at all.
    #[error("JSON store '{path}' is empty or not a list")]
    EmptyStore { path: PathBuf },

    /// No object in the store carries a single key.
    #[error("No fields found in the objects of '{path}'")]
    NoColumns { path: PathBuf },

    /// Writing the spreadsheet failed.
    #[error("Failed to write workbook '{path}': {detail}")]
    WorkbookWriteFailed { path: PathBuf, detail: String },

    // ── Backend errors ────────────────────────────────────────────────────
    /// The configured inference backend could not be initialised.
    #[error("Inference backend '{backend}' is not configured.\n{hint}")]
    BackendNotConfigured { backend: String, hint: String },

    /// A remote call failed outside the per-page path (e.g. while purging).
    #[error(transparent)]
    Client(#[from] ClientError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single screenshot page.
///
/// The page contributes zero records; sibling pages are unaffected.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Upload, inference, or any other remote call failed.
    #[error("[{index}/{total}] Error processing {file}: {detail}")]
    Transport {
        index: usize,
        total: usize,
        file: String,
        detail: String,
    },

    /// The model answered, but not with JSON we can use.
    #[error("[{index}/{total}] Error: {detail} for {file}.")]
    MalformedOutput {
        index: usize,
        total: usize,
        file: String,
        detail: String,
    },

    /// The worker task panicked before producing a result.
    #[error("[{index}/{total}] Worker for {file} panicked: {detail}")]
    Panicked {
        index: usize,
        total: usize,
        file: String,
        detail: String,
    },
}

impl PageError {
    /// 1-based position of the failing page in the full input set.
    pub fn index(&self) -> usize {
        match self {
            PageError::Transport { index, .. }
            | PageError::MalformedOutput { index, .. }
            | PageError::Panicked { index, .. } => *index,
        }
    }
}

/// A failed call to the remote inference collaborator.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection failed, TLS error, timeout.
    #[error("Network error: {0}")]
    Network(String),

    /// The service answered with a non-2xx status.
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// The service answered 2xx but the body was not what we expected.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Reading the local image failed.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The edgequake-llm provider returned an error.
    #[error("LLM provider error: {0}")]
    Provider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_display_carries_page_context() {
        let e = PageError::Transport {
            index: 4,
            total: 12,
            file: "page_004.png".into(),
            detail: "Network error: connection reset".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("[4/12]"), "got: {msg}");
        assert!(msg.contains("page_004.png"));
        assert_eq!(e.index(), 4);
    }

    #[test]
    fn malformed_display() {
        let e = PageError::MalformedOutput {
            index: 1,
            total: 2,
            file: "a.png".into(),
            detail: "AI output was not valid JSON".into(),
        };
        assert_eq!(
            e.to_string(),
            "[1/2] Error: AI output was not valid JSON for a.png."
        );
    }

    #[test]
    fn api_error_display() {
        let e = ClientError::Api {
            status: 429,
            body: "quota".into(),
        };
        assert!(e.to_string().contains("429"));
        assert!(e.to_string().contains("quota"));
    }

    #[test]
    fn client_error_converts_to_fatal() {
        let e: Shot2SheetError = ClientError::Network("down".into()).into();
        assert!(e.to_string().contains("down"));
    }
}
