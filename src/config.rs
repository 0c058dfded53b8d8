//! Configuration types for screenshot-to-records extraction.
//!
//! Every knob of a run lives in [`ExtractionConfig`], built once via its
//! [`ExtractionConfigBuilder`] and then handed (behind an `Arc`) to the
//! dispatcher and every worker. Nothing reads process-wide mutable state:
//! two runs with two configs can share one process.
//!
//! Credentials are deliberately absent. They belong to the
//! [`crate::client::InferenceClient`] the caller constructs.

use crate::error::Shot2SheetError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Records one fully extracted screenshot contributes.
///
/// The checkpoint arithmetic divides the store length by this value, so it
/// must match the number of visible rows per page in the source table.
pub const DEFAULT_PAGE_WIDTH: usize = 19;

/// Configuration for an extraction run.
///
/// # Example
/// ```rust
/// use shot2sheet::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .screenshots_dir("shots")
///     .store_path("out/data.json")
///     .concurrency(20)
///     .build()
///     .unwrap();
/// assert_eq!(config.page_width, 19);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Directory holding one screenshot per table page. Default: `Screenshots`.
    pub screenshots_dir: PathBuf,

    /// JSON record store, read at startup and rewritten after every page.
    /// Default: `data.json`.
    pub store_path: PathBuf,

    /// File extension of the screenshots, without the dot. Default: `png`.
    pub extension: String,

    /// NominalPageWidth: records one complete page contributes. Default: 19.
    pub page_width: usize,

    /// Maximum in-flight extractions. Default: 100.
    ///
    /// Each extraction is three network round trips and no CPU work, so a
    /// high bound is cheap. Lower it if the service answers with 429s.
    pub concurrency: usize,

    /// Model identifier. Default: `gemini-2.5-flash-lite`.
    pub model: String,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Nucleus sampling cutoff. Default: 1.0.
    pub top_p: f32,

    /// Top-k sampling cutoff. Default: 32.
    pub top_k: u32,

    /// Maximum tokens generated per page. Default: 8192.
    ///
    /// Nineteen rows of eight fields in JSON stays well below 4 000 tokens;
    /// the headroom covers pages where the model echoes long deal links.
    pub max_output_tokens: u32,

    /// Retries of the inference call on a transport failure. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-HTTP-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom extraction instruction. If None, uses the built-in prompt.
    pub system_prompt: Option<String>,

    /// Receives per-page events from the aggregator.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            screenshots_dir: PathBuf::from("Screenshots"),
            store_path: PathBuf::from("data.json"),
            extension: "png".to_string(),
            page_width: DEFAULT_PAGE_WIDTH,
            concurrency: 100,
            model: "gemini-2.5-flash-lite".to_string(),
            temperature: 0.1,
            top_p: 1.0,
            top_k: 32,
            max_output_tokens: 8192,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("screenshots_dir", &self.screenshots_dir)
            .field("store_path", &self.store_path)
            .field("extension", &self.extension)
            .field("page_width", &self.page_width)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_retries", &self.max_retries)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn screenshots_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.screenshots_dir = dir.into();
        self
    }

    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store_path = path.into();
        self
    }

    /// Accepts `png`, `.png` or `PNG` alike.
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        let ext = ext.into();
        self.config.extension = ext.trim_start_matches('.').to_ascii_lowercase();
        self
    }

    pub fn page_width(mut self, n: usize) -> Self {
        self.config.page_width = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn top_k(mut self, k: u32) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Shot2SheetError> {
        let c = &self.config;
        if c.page_width == 0 {
            return Err(Shot2SheetError::InvalidConfig(
                "Page width must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Shot2SheetError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.extension.is_empty() {
            return Err(Shot2SheetError::InvalidConfig(
                "Screenshot extension must not be empty".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(Shot2SheetError::InvalidConfig("Model must not be empty".into()));
        }
        Ok(self.config)
    }
}
