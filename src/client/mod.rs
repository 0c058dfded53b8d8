//! Remote inference collaborator: the seam between the pipeline and a VLM.
//!
//! The pipeline only ever needs four things from a vision service: put an
//! image somewhere the model can see it, ask the model about it, take the
//! image away again, and (for the purge utility) enumerate everything still
//! up there. [`InferenceClient`] is exactly that surface.
//!
//! Two backends ship:
//!
//! * [`GeminiClient`] — the Gemini Files API plus `generateContent`. Uploads
//!   are real remote objects and must be deleted.
//! * [`ProviderClient`] — any `edgequake-llm` provider. "Uploading" encodes
//!   the image into an in-memory registry; the handle is local.
//!
//! Tests plug in their own implementation.

pub mod gemini;
pub mod provider;

use crate::error::ClientError;
use async_trait::async_trait;
use std::path::Path;

pub use gemini::GeminiClient;
pub use provider::ProviderClient;

/// Opaque handle to an image the model can reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Backend identifier, e.g. `files/abc123`.
    pub name: String,
    /// Human-readable name; the local file name for our uploads.
    pub display_name: Option<String>,
    /// URI the model call references. Empty for local handles.
    pub uri: String,
    pub mime_type: String,
}

/// A vision-language service that can read uploaded screenshots.
///
/// Implementations must be cheap to share: the dispatcher holds one behind
/// an `Arc` and calls it from up to `concurrency` tasks at once.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Make the image at `path` available to the model.
    async fn upload(&self, path: &Path) -> Result<RemoteFile, ClientError>;

    /// Run the extraction instruction against an uploaded image and return
    /// the raw response text.
    async fn generate(&self, prompt: &str, file: &RemoteFile) -> Result<String, ClientError>;

    /// Release an uploaded image.
    async fn delete(&self, file: &RemoteFile) -> Result<(), ClientError>;

    /// Every image this account or client currently holds.
    async fn list(&self) -> Result<Vec<RemoteFile>, ClientError>;
}
