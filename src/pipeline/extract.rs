//! Per-page extraction: upload → infer → parse, then always delete.
//!
//! The remote handle is held by a [`HandleGuard`]. The normal path releases
//! it explicitly and awaits the delete call; if the future is dropped
//! mid-flight (worker panic, runtime shutdown) the guard's `Drop` schedules
//! the delete on the runtime instead. Delete failures are never surfaced.
//!
//! ## Retry Strategy
//!
//! Only the inference call is retried, with `retry_backoff_ms * 2^attempt`
//! backoff. A failed upload has no handle to reuse, and a malformed answer is
//! a model decision, not a transport fault.

use crate::client::{InferenceClient, RemoteFile};
use crate::config::ExtractionConfig;
use crate::error::{ClientError, PageError};
use crate::output::{ImagePage, PageResult};
use crate::pipeline::parse::parse_response;
use crate::prompts::extraction_prompt;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Extract the records of one screenshot.
///
/// Always returns a `PageResult`; every failure mode becomes
/// `records: vec![]` plus a [`PageError`] so one bad page never reaches its
/// siblings.
///
/// # Arguments
/// * `page`  — the screenshot; `page.index` is its position in the full set
/// * `total` — every screenshot in the run, for `[i/total]` log context
pub async fn extract_page(
    client: Arc<dyn InferenceClient>,
    page: &ImagePage,
    total: usize,
    config: &ExtractionConfig,
) -> PageResult {
    let start = Instant::now();
    let index = page.display_index();
    let file = page.file_name();

    let outcome = match client.upload(&page.path).await {
        Ok(remote) => {
            let guard = HandleGuard::new(Arc::clone(&client), remote.clone());
            let raw = generate_with_retry(client.as_ref(), &remote, index, config).await;
            guard.release().await;
            raw
        }
        Err(e) => Err(e),
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let result = outcome
        .map_err(|e| PageError::Transport {
            index,
            total,
            file: file.clone(),
            detail: e.to_string(),
        })
        .and_then(|raw| {
            parse_response(&raw).map_err(|e| PageError::MalformedOutput {
                index,
                total,
                file: file.clone(),
                detail: e.to_string(),
            })
        });

    match result {
        Ok(records) => {
            debug!("[{}/{}] {}: {} records in {}ms", index, total, file, records.len(), duration_ms);
            PageResult {
                index,
                records,
                duration_ms,
                error: None,
            }
        }
        Err(error) => {
            warn!("{}", error);
            PageResult {
                index,
                records: Vec::new(),
                duration_ms,
                error: Some(error),
            }
        }
    }
}

async fn generate_with_retry(
    client: &dyn InferenceClient,
    file: &RemoteFile,
    index: usize,
    config: &ExtractionConfig,
) -> Result<String, ClientError> {
    let prompt = extraction_prompt(config.system_prompt.as_deref());
    let mut attempt = 0u32;

    loop {
        match client.generate(prompt, file).await {
            Ok(text) => return Ok(text),
            Err(e) if attempt < config.max_retries => {
                let backoff = backoff_ms(config.retry_backoff_ms, attempt);
                attempt += 1;
                warn!(
                    "Page {}: retry {}/{} after {}ms ({})",
                    index, attempt, config.max_retries, backoff, e
                );
                sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// `base * 2^attempt`, saturating instead of overflowing.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt))
}

/// Owns one remote handle until it is released.
struct HandleGuard {
    client: Arc<dyn InferenceClient>,
    file: Option<RemoteFile>,
}

impl HandleGuard {
    fn new(client: Arc<dyn InferenceClient>, file: RemoteFile) -> Self {
        Self {
            client,
            file: Some(file),
        }
    }

    /// Delete the handle now, ignoring failure.
    async fn release(mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = self.client.delete(&file).await {
                debug!("Ignoring delete failure for {}: {}", file.name, e);
            }
        }
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        let client = Arc::clone(&self.client);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = client.delete(&file).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted client: fixed response, optional failures, counts calls.
    #[derive(Default)]
    struct Scripted {
        response: String,
        fail_upload: bool,
        fail_generate_times: usize,
        fail_delete: bool,
        uploads: AtomicUsize,
        generates: AtomicUsize,
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl InferenceClient for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn upload(&self, path: &Path) -> Result<RemoteFile, ClientError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            if self.fail_upload {
                return Err(ClientError::Network("upload refused".into()));
            }
            Ok(RemoteFile {
                name: format!("files/{}", path.display()),
                display_name: None,
                uri: String::new(),
                mime_type: "image/png".into(),
            })
        }

        async fn generate(&self, _prompt: &str, _file: &RemoteFile) -> Result<String, ClientError> {
            let n = self.generates.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_generate_times {
                return Err(ClientError::Api {
                    status: 503,
                    body: "overloaded".into(),
                });
            }
            Ok(self.response.clone())
        }

        async fn delete(&self, _file: &RemoteFile) -> Result<(), ClientError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete {
                return Err(ClientError::Network("delete refused".into()));
            }
            Ok(())
        }

        async fn list(&self) -> Result<Vec<RemoteFile>, ClientError> {
            Ok(Vec::new())
        }
    }

    fn page() -> ImagePage {
        ImagePage {
            path: PathBuf::from("shots/p_004.png"),
            index: 3,
        }
    }

    fn config() -> ExtractionConfig {
        ExtractionConfig::builder().retry_backoff_ms(1).build().unwrap()
    }

    #[tokio::test]
    async fn success_yields_records_and_deletes_handle() {
        let client = Arc::new(Scripted {
            response: r#"[{"NAME": "a"}, {"NAME": "b"}]"#.into(),
            ..Default::default()
        });
        let result = extract_page(client.clone(), &page(), 10, &config()).await;
        assert!(result.error.is_none());
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.index, 4);
        assert_eq!(client.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_output_still_deletes_handle() {
        let client = Arc::new(Scripted {
            response: "I see a table with names.".into(),
            ..Default::default()
        });
        let result = extract_page(client.clone(), &page(), 10, &config()).await;
        assert!(result.records.is_empty());
        assert!(matches!(result.error, Some(PageError::MalformedOutput { index: 4, .. })));
        assert_eq!(client.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_failure_after_upload_deletes_handle() {
        let client = Arc::new(Scripted {
            fail_generate_times: usize::MAX,
            ..Default::default()
        });
        let result = extract_page(client.clone(), &page(), 10, &config()).await;
        let err = result.error.expect("page should fail");
        assert!(err.to_string().starts_with("[4/10] Error processing p_004.png"));
        assert_eq!(client.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_upload_has_nothing_to_delete() {
        let client = Arc::new(Scripted {
            fail_upload: true,
            ..Default::default()
        });
        let result = extract_page(client.clone(), &page(), 10, &config()).await;
        assert!(matches!(result.error, Some(PageError::Transport { .. })));
        assert_eq!(client.generates.load(Ordering::SeqCst), 0);
        assert_eq!(client.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn delete_failure_is_swallowed() {
        let client = Arc::new(Scripted {
            response: r#"{"NAME": "solo"}"#.into(),
            fail_delete: true,
            ..Default::default()
        });
        let result = extract_page(client.clone(), &page(), 1, &config()).await;
        assert!(result.error.is_none());
        assert_eq!(result.records.len(), 1);
    }

    #[tokio::test]
    async fn inference_is_retried_up_to_max_retries() {
        let client = Arc::new(Scripted {
            response: "[]".into(),
            fail_generate_times: 2,
            ..Default::default()
        });
        let cfg = ExtractionConfig::builder()
            .max_retries(2)
            .retry_backoff_ms(1)
            .build()
            .unwrap();
        let result = extract_page(client.clone(), &page(), 1, &cfg).await;
        assert!(result.error.is_none());
        assert_eq!(client.generates.load(Ordering::SeqCst), 3);
        assert_eq!(client.uploads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 0), 500);
        assert_eq!(backoff_ms(500, 3), 4000);
        assert_eq!(backoff_ms(500, 60), u64::MAX);
        assert_eq!(backoff_ms(500, 64), u64::MAX);
        assert_eq!(backoff_ms(0, 100), 0);
    }

    #[tokio::test]
    async fn dropped_guard_schedules_delete() {
        let client = Arc::new(Scripted::default());
        let remote = client.upload(Path::new("x.png")).await.unwrap();
        drop(HandleGuard::new(client.clone() as Arc<dyn InferenceClient>, remote));
        tokio::task::yield_now().await;
        for _ in 0..10 {
            if client.deletes.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(client.deletes.load(Ordering::SeqCst), 1);
    }
}
