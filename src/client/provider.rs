//! Any `edgequake-llm` vision provider as an [`InferenceClient`].
//!
//! Chat-completion APIs take images inline, so there is nothing to upload.
//! `upload` reads and base64-encodes the screenshot into a registry keyed by
//! a local handle name; `delete` drops it. The handle lifecycle is the same
//! as for Gemini, which keeps the extractor backend-agnostic.

use super::{InferenceClient, RemoteFile};
use crate::config::ExtractionConfig;
use crate::error::{ClientError, Shot2SheetError};
use crate::pipeline::encode;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

const LOCAL_PREFIX: &str = "local/";

/// Adapter from an `edgequake-llm` provider to the pipeline's client trait.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: f32,
    max_tokens: usize,
    next_id: AtomicU64,
    images: Mutex<HashMap<String, (RemoteFile, ImageData)>>,
}

impl ProviderClient {
    /// Wrap a pre-built provider.
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            label: label.into(),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens as usize,
            next_id: AtomicU64::new(0),
            images: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a provider, from most-specific to least-specific:
    ///
    /// 1. **Named provider** (`provider_name`) with `config.model`.
    /// 2. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
    /// 3. **Auto-detection** via [`ProviderFactory::from_env`], which scans the
    ///    known API key variables.
    pub fn resolve(
        provider_name: Option<&str>,
        config: &ExtractionConfig,
    ) -> Result<Self, Shot2SheetError> {
        if let Some(name) = provider_name {
            let provider = create_vision_provider(name, &config.model)?;
            return Ok(Self::new(provider, name, config));
        }

        if let (Ok(prov), Ok(model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !model.is_empty() {
                let provider = create_vision_provider(&prov, &model)?;
                return Ok(Self::new(provider, prov, config));
            }
        }

        let (provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| Shot2SheetError::BackendNotConfigured {
                backend: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                    Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or use --backend gemini.\n\
                    Error: {}",
                    e
                ),
            })?;
        Ok(Self::new(provider, "auto", config))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    fn lookup(&self, file: &RemoteFile) -> Result<ImageData, ClientError> {
        let images = self
            .images
            .lock()
            .map_err(|_| ClientError::Provider("image registry poisoned".into()))?;
        images
            .get(&file.name)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| ClientError::Provider(format!("unknown handle {}", file.name)))
    }

    /// Handles currently held.
    pub fn held(&self) -> usize {
        self.images.lock().map(|m| m.len()).unwrap_or(0)
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Shot2SheetError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Shot2SheetError::BackendNotConfigured {
            backend: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[async_trait]
impl InferenceClient for ProviderClient {
    fn name(&self) -> &str {
        &self.label
    }

    async fn upload(&self, path: &Path) -> Result<RemoteFile, ClientError> {
        let data = encode::encode_file(path)
            .await
            .map_err(|source| ClientError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let file = RemoteFile {
            name: format!("{LOCAL_PREFIX}{id}"),
            display_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            uri: String::new(),
            mime_type: encode::mime_type_for(path).to_string(),
        };

        self.images
            .lock()
            .map_err(|_| ClientError::Provider("image registry poisoned".into()))?
            .insert(file.name.clone(), (file.clone(), data));
        Ok(file)
    }

    async fn generate(&self, prompt: &str, file: &RemoteFile) -> Result<String, ClientError> {
        let image = self.lookup(file)?;
        let messages = vec![
            ChatMessage::system(prompt),
            ChatMessage::user_with_images("", vec![image]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| ClientError::Provider(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            file.name, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }

    async fn delete(&self, file: &RemoteFile) -> Result<(), ClientError> {
        self.images
            .lock()
            .map_err(|_| ClientError::Provider("image registry poisoned".into()))?
            .remove(&file.name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RemoteFile>, ClientError> {
        let images = self
            .images
            .lock()
            .map_err(|_| ClientError::Provider("image registry poisoned".into()))?;
        Ok(images.values().map(|(file, _)| file.clone()).collect())
    }
}
