//! Concurrent dispatch with in-order delivery.
//!
//! Every page is spawned on its own tokio task up front. A [`Semaphore`]
//! with `concurrency` permits bounds how many of them run an extraction at
//! once, so a free permit goes to the next waiting page as soon as any
//! worker finishes, whatever its position.
//!
//! Resume is arithmetic over the store length, so records must land in the
//! store in page order. The join handles are therefore awaited in input
//! order: a slow page 3 holds back the *delivery* of an already finished
//! page 4, never the start of page 9.
//!
//! A worker that panics is reported as [`PageError::Panicked`] in its slot,
//! so the stream always yields exactly one item per input page.

use crate::client::InferenceClient;
use crate::config::ExtractionConfig;
use crate::error::PageError;
use crate::output::{ImagePage, PageResult};
use crate::pipeline::extract::extract_page;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_stream::Stream;
use tracing::error;

/// A boxed stream of page results, in dispatch order.
pub type PageStream = Pin<Box<dyn Stream<Item = PageResult> + Send>>;

/// Extract `pages` concurrently and stream the results in input order.
///
/// Tasks are spawned when the stream is first polled, so this must be
/// polled from inside a tokio runtime.
///
/// # Arguments
/// * `pages` — screenshots still to extract, already in page order
/// * `total` — every screenshot in the run (for `[i/total]` log context)
pub fn dispatch(
    client: Arc<dyn InferenceClient>,
    config: Arc<ExtractionConfig>,
    pages: Vec<ImagePage>,
    total: usize,
) -> PageStream {
    let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
    // Every handle is pulled on the first poll; only the permits throttle.
    let window = pages.len().max(1);

    let s = stream::iter(pages)
        .map(move |page| {
            let index = page.display_index();
            let file = page.file_name();
            let client = Arc::clone(&client);
            let cfg = Arc::clone(&config);
            let permits = Arc::clone(&permits);

            let task = tokio::spawn(async move {
                // The semaphore is never closed; the permit lives until the page is done.
                let _permit = permits.acquire_owned().await;
                extract_page(client, &page, total, &cfg).await
            });

            async move {
                match task.await {
                    Ok(result) => result,
                    Err(join_err) => {
                        let err = PageError::Panicked {
                            index,
                            total,
                            file,
                            detail: join_err.to_string(),
                        };
                        error!("{}", err);
                        PageResult {
                            index,
                            records: Vec::new(),
                            duration_ms: 0,
                            error: Some(err),
                        }
                    }
                }
            }
        })
        .buffered(window);

    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RemoteFile;
    use crate::error::ClientError;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers with one record named after the file; earlier pages are slower.
    #[derive(Default)]
    struct SlowFirst {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        panic_on: Option<&'static str>,
    }

    #[async_trait]
    impl InferenceClient for SlowFirst {
        fn name(&self) -> &str {
            "slow-first"
        }

        async fn upload(&self, path: &Path) -> Result<RemoteFile, ClientError> {
            Ok(RemoteFile {
                name: path.file_name().unwrap().to_string_lossy().into_owned(),
                display_name: None,
                uri: String::new(),
                mime_type: "image/png".into(),
            })
        }

        async fn generate(&self, _prompt: &str, file: &RemoteFile) -> Result<String, ClientError> {
            if self.panic_on == Some(file.name.as_str()) {
                panic!("model exploded");
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            // p0 sleeps longest, p7 shortest.
            let n: u64 = file.name[1..2].parse().unwrap();
            tokio::time::sleep(Duration::from_millis(5 * (8 - n))).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!(r#"[{{"NAME": "{}"}}]"#, file.name))
        }

        async fn delete(&self, _file: &RemoteFile) -> Result<(), ClientError> {
            Ok(())
        }

        async fn list(&self) -> Result<Vec<RemoteFile>, ClientError> {
            Ok(Vec::new())
        }
    }

    fn pages(n: usize) -> Vec<ImagePage> {
        (0..n)
            .map(|i| ImagePage {
                path: PathBuf::from(format!("p{i}.png")),
                index: i,
            })
            .collect()
    }

    fn config(concurrency: usize) -> Arc<ExtractionConfig> {
        Arc::new(ExtractionConfig::builder().concurrency(concurrency).build().unwrap())
    }

    #[tokio::test]
    async fn results_arrive_in_page_order() {
        let client = Arc::new(SlowFirst::default());
        let results: Vec<PageResult> = dispatch(client, config(8), pages(8), 8).collect().await;

        let names: Vec<String> = results.iter().map(|r| r.records[0].name.clone()).collect();
        let expected: Vec<String> = (0..8).map(|i| format!("p{i}.png")).collect();
        assert_eq!(names, expected);
        assert_eq!(results.iter().map(|r| r.index).collect::<Vec<_>>(), (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn in_flight_never_exceeds_concurrency() {
        let client = Arc::new(SlowFirst::default());
        let results: Vec<PageResult> = dispatch(client.clone(), config(3), pages(8), 8).collect().await;
        assert_eq!(results.len(), 8);
        assert!(client.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn panicking_worker_becomes_a_failed_page() {
        let client = Arc::new(SlowFirst {
            panic_on: Some("p2.png"),
            ..Default::default()
        });
        let results: Vec<PageResult> = dispatch(client, config(4), pages(5), 5).collect().await;

        assert_eq!(results.len(), 5);
        assert!(matches!(results[2].error, Some(PageError::Panicked { index: 3, .. })));
        assert!(results[2].records.is_empty());
        for i in [0, 1, 3, 4] {
            assert!(results[i].error.is_none());
            assert_eq!(results[i].records.len(), 1);
        }
    }

    #[tokio::test]
    async fn empty_input_yields_empty_stream() {
        let client = Arc::new(SlowFirst::default());
        let results: Vec<PageResult> = dispatch(client, config(4), Vec::new(), 0).collect().await;
        assert!(results.is_empty());
    }

    /// Page 0 stalls until released; every other page returns at once.
    #[derive(Default)]
    struct StuckHead {
        head_done: std::sync::atomic::AtomicBool,
        started_behind_head: AtomicUsize,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl InferenceClient for StuckHead {
        fn name(&self) -> &str {
            "stuck-head"
        }

        async fn upload(&self, path: &Path) -> Result<RemoteFile, ClientError> {
            Ok(RemoteFile {
                name: path.file_name().unwrap().to_string_lossy().into_owned(),
                display_name: None,
                uri: String::new(),
                mime_type: "image/png".into(),
            })
        }

        async fn generate(&self, _prompt: &str, file: &RemoteFile) -> Result<String, ClientError> {
            if file.name == "p0.png" {
                self.release.notified().await;
                self.head_done.store(true, Ordering::SeqCst);
            } else if !self.head_done.load(Ordering::SeqCst) {
                self.started_behind_head.fetch_add(1, Ordering::SeqCst);
            }
            Ok(format!(r#"[{{"NAME": "{}"}}]"#, file.name))
        }

        async fn delete(&self, _file: &RemoteFile) -> Result<(), ClientError> {
            Ok(())
        }

        async fn list(&self) -> Result<Vec<RemoteFile>, ClientError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn slow_head_page_does_not_starve_the_pool() {
        let client = Arc::new(StuckHead::default());
        let mut results = dispatch(client.clone(), config(4), pages(12), 12);

        // Wait until the other eleven pages have all run behind the stuck head.
        let waiter = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                while client.started_behind_head.load(Ordering::SeqCst) < 11 {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                client.release.notify_one();
            })
        };

        let first = tokio::time::timeout(Duration::from_secs(5), results.next())
            .await
            .expect("pool stalled behind the head page")
            .unwrap();
        waiter.await.unwrap();

        assert_eq!(first.index, 1);
        assert_eq!(client.started_behind_head.load(Ordering::SeqCst), 11);
        let rest: Vec<PageResult> = results.collect().await;
        assert_eq!(rest.iter().map(|r| r.index).collect::<Vec<_>>(), (2..=12).collect::<Vec<_>>());
    }
}
