//! Gemini Files API + `generateContent` over plain REST.
//!
//! Uploads use the two-step resumable protocol: a JSON `start` request that
//! returns a session URL in the `x-goog-upload-url` header, then one
//! `upload, finalize` request carrying the bytes. The API key travels in the
//! `x-goog-api-key` header so it never appears in a logged URL.

use super::{InferenceClient, RemoteFile};
use crate::config::ExtractionConfig;
use crate::error::{ClientError, Shot2SheetError};
use crate::pipeline::encode::mime_type_for;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_KEY_HEADER: &str = "x-goog-api-key";
const LIST_PAGE_SIZE: u32 = 100;

/// Sampling parameters sent with every `generateContent` call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl From<&ExtractionConfig> for GenerationParams {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// Gemini REST client bound to one model and one set of sampling params.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    params: GenerationParams,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Build a client for the model and sampling settings in `config`.
    pub fn new(
        api_key: impl Into<String>,
        config: &ExtractionConfig,
    ) -> Result<Self, Shot2SheetError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Shot2SheetError::BackendNotConfigured {
                backend: "gemini".into(),
                hint: "Set GEMINI_API_KEY or pass --api-key.".into(),
            });
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| Shot2SheetError::BackendNotConfigured {
                backend: "gemini".into(),
                hint: format!("HTTP client setup failed: {e}"),
            })?;

        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: config.model.clone(),
            params: GenerationParams::from(config),
        })
    }

    /// Create from `GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`.
    pub fn from_env(config: &ExtractionConfig) -> Result<Self, Shot2SheetError> {
        let key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .unwrap_or_default();
        Self::new(key, config)
    }

    /// Point at a different endpoint (proxy, test server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn start_upload(
        &self,
        display_name: &str,
        mime_type: &str,
        len: usize,
    ) -> Result<String, ClientError> {
        let response = self
            .http
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", len.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(network)?;
        let response = check_status(response).await?;

        response
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode("upload start returned no session URL".into()))
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn upload(&self, path: &Path) -> Result<RemoteFile, ClientError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ClientError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mime_type = mime_type_for(path);
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let session_url = self
            .start_upload(&display_name, mime_type, bytes.len())
            .await?;

        let response = self
            .http
            .post(session_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(network)?;
        let response = check_status(response).await?;

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        debug!("Uploaded {} as {}", display_name, body.file.name);
        Ok(body.file.into_remote(mime_type))
    }

    async fn generate(&self, prompt: &str, file: &RemoteFile) -> Result<String, ClientError> {
        let start = Instant::now();
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prompt },
                    { "file_data": { "mime_type": file.mime_type, "file_uri": file.uri } }
                ]
            }],
            "generationConfig": {
                "temperature": self.params.temperature,
                "topP": self.params.top_p,
                "topK": self.params.top_k,
                "maxOutputTokens": self.params.max_output_tokens,
                "responseMimeType": "application/json"
            }
        });

        let response = self
            .http
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(network)?;
        let response = check_status(response).await?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "Gemini generateContent"
        );
        parsed.into_text()
    }

    async fn delete(&self, file: &RemoteFile) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(format!("{}/v1beta/{}", self.base_url, file.name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(network)?;
        check_status(response).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RemoteFile>, ClientError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}/v1beta/files", self.base_url))
                .header(API_KEY_HEADER, &self.api_key)
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = check_status(request.send().await.map_err(network)?).await?;
            let page: ListResponse = response
                .json()
                .await
                .map_err(|e| ClientError::Decode(e.to_string()))?;

            files.extend(page.files.into_iter().map(|f| {
                let mime = f.mime_type.clone().unwrap_or_default();
                f.into_remote(&mime)
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }
}

fn network(e: reqwest::Error) -> ClientError {
    ClientError::Network(e.to_string())
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, "Gemini API error");
    Err(ClientError::Api {
        status: status.as_u16(),
        body,
    })
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    uri: Option<String>,
}

impl FileResource {
    fn into_remote(self, fallback_mime: &str) -> RemoteFile {
        RemoteFile {
            name: self.name,
            display_name: self.display_name,
            uri: self.uri.unwrap_or_default(),
            mime_type: self
                .mime_type
                .unwrap_or_else(|| fallback_mime.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileResource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    files: Vec<FileResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn into_text(self) -> Result<String, ClientError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let feedback = self
                .prompt_feedback
                .map(|v| v.to_string())
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(ClientError::Decode(format!("empty response: {feedback}")));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ClientError::Decode(format!(
                "candidate has no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new("test-key", &ExtractionConfig::default())
            .unwrap()
            .with_base_url(server.uri())
    }

    fn remote() -> RemoteFile {
        RemoteFile {
            name: "files/abc".into(),
            display_name: Some("p1.png".into()),
            uri: "https://example.invalid/files/abc".into(),
            mime_type: "image/png".into(),
        }
    }

    #[test]
    fn empty_key_rejected() {
        let err = GeminiClient::new(" ", &ExtractionConfig::default()).unwrap_err();
        assert!(matches!(err, Shot2SheetError::BackendNotConfigured { .. }));
    }

    #[test]
    fn debug_hides_key() {
        let c = GeminiClient::new("secret-key", &ExtractionConfig::default()).unwrap();
        assert!(!format!("{c:?}").contains("secret-key"));
    }

    #[tokio::test]
    async fn upload_runs_resumable_protocol() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-goog-upload-url", format!("{}/session/1", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "file": {
                    "name": "files/abc",
                    "displayName": "p1.png",
                    "mimeType": "image/png",
                    "uri": "https://example.invalid/files/abc"
                }
            })))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let img = tmp.path().join("p1.png");
        std::fs::write(&img, b"png-bytes").unwrap();

        let file = client(&server).upload(&img).await.unwrap();
        assert_eq!(file, remote());

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[1].body, b"png-bytes");
    }

    #[tokio::test]
    async fn generate_concatenates_text_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash-lite:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "[{\"NAME\":" }, { "text": " \"Ana\"}]" }] },
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let text = client(&server).generate("prompt", &remote()).await.unwrap();
        assert_eq!(text, "[{\"NAME\": \"Ana\"}]");

        let received = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(sent["generationConfig"]["topK"], 32);
        assert_eq!(sent["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(
            sent["contents"][0]["parts"][1]["file_data"]["file_uri"],
            "https://example.invalid/files/abc"
        );
    }

    #[tokio::test]
    async fn api_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1beta/files/abc"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let err = client(&server).delete(&remote()).await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn list_follows_page_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files"))
            .and(query_param("pageToken", "next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{ "name": "files/b" }]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{ "name": "files/a" }],
                "nextPageToken": "next"
            })))
            .mount(&server)
            .await;

        let files = client(&server).list().await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["files/a", "files/b"]);
    }
}
