//! Providers for OpenAI-compatible HTTP APIs.
//!
//! [`OpenAIEmbeddingProvider`] calls `/embeddings` and [`OpenAIChatGenerator`]
//! calls `/chat/completions`. Both accept a custom base URL, so any
//! compatible service (Groq, a local inference server) can be used.
//!
//! This module is only available when the `openai` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::answer::TextGenerator;
use crate::embedding::{EmbeddingProvider, l2_normalize};
use crate::error::{RagError, Result};

/// The default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The Groq OpenAI-compatible base URL.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Output size of `text-embedding-3-small`.
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;
const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings shared by both providers.
struct ApiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    provider: String,
}

impl ApiClient {
    fn new(api_key: String, base_url: &str, provider: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_http(timeout, provider)?,
            api_key: require_key(api_key, provider)?,
            base_url: trim_base_url(base_url),
            provider: provider.to_string(),
        })
    }

    /// POST `body` as JSON to `{base_url}/{path}` and decode the reply.
    ///
    /// Failures are logged and returned as a message for the caller to wrap
    /// in its own error variant.
    async fn post<B, R>(&self, path: &str, body: &B) -> std::result::Result<R, String>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/{path}", self.base_url);
        let response =
            self.http.post(&url).bearer_auth(&self.api_key).json(body).send().await.map_err(
                |e| {
                    error!(provider = %self.provider, %url, error = %e, "request failed");
                    format!("request failed: {e}")
                },
            )?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(provider = %self.provider, %url, %status, "API error");
            return Err(format!("API returned {status}: {}", error_detail(body)));
        }

        response.json().await.map_err(|e| {
            error!(provider = %self.provider, %url, error = %e, "failed to parse response");
            format!("failed to parse response: {e}")
        })
    }
}

fn build_http(timeout: Duration, provider: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::ConfigError(format!("failed to create {provider} HTTP client: {e}")))
}

fn require_key(api_key: String, provider: &str) -> Result<String> {
    if api_key.trim().is_empty() {
        return Err(RagError::ConfigError(format!("{provider} API key must not be empty")));
    }
    Ok(api_key)
}

fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// The `error.message` of an API error body, or the raw body.
fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings API.
///
/// Vectors are returned in input order and re-normalized to unit length,
/// whatever order and scale the service replies with.
///
/// # Example
///
/// ```rust,ignore
/// use carbon_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::from_env()?.with_dimensions(384);
/// let embedding = provider.embed("Scope 3 category 1").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    api: ApiClient,
    model: String,
    dimensions: usize,
    /// Sent to the API for Matryoshka truncation when set.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider for `text-embedding-3-small` at [`OPENAI_BASE_URL`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(api_key.into(), OPENAI_BASE_URL, "OpenAI", DEFAULT_TIMEOUT)?,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::ConfigError("OPENAI_API_KEY environment variable not set".into())
        })?;
        Self::new(api_key)
    }

    /// Point at another compatible service (without the trailing `/embeddings`).
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.api.base_url = trim_base_url(base_url.as_ref());
        self
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request `dims`-long vectors; also changes [`EmbeddingProvider::dimensions`].
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    fn embedding_error(&self, message: impl Into<String>) -> RagError {
        RagError::EmbeddingError { provider: self.api.provider.clone(), message: message.into() }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Restore input order, check the count, and re-normalize each vector.
fn into_embeddings(
    mut response: EmbeddingResponse,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, String> {
    if response.data.len() != expected {
        return Err(format!("expected {expected} embeddings, got {}", response.data.len()));
    }
    response.data.sort_by_key(|d| d.index);
    Ok(response
        .data
        .into_iter()
        .map(|d| {
            let mut embedding = d.embedding;
            l2_normalize(&mut embedding);
            embedding
        })
        .collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .ok_or_else(|| self.embedding_error("API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            provider = %self.api.provider,
            model = %self.model,
            batch_size = texts.len(),
            "embedding batch"
        );

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimensions,
        };
        let response: EmbeddingResponse =
            self.api.post("embeddings", &request).await.map_err(|m| self.embedding_error(m))?;
        into_embeddings(response, texts.len()).map_err(|m| self.embedding_error(m))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A [`TextGenerator`] backed by an OpenAI-compatible chat completions API.
///
/// The prompt is sent as a single user message.
///
/// ```rust,ignore
/// use carbon_rag::openai::OpenAIChatGenerator;
///
/// let generator = OpenAIChatGenerator::groq(std::env::var("GROQ_API_KEY")?)?;
/// let text = generator.generate("What is Scope 1?").await?;
/// ```
pub struct OpenAIChatGenerator {
    api: ApiClient,
    model: String,
    temperature: f32,
}

impl OpenAIChatGenerator {
    /// Create a generator for an arbitrary compatible endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the key is empty.
    pub fn compatible(
        api_key: impl Into<String>,
        base_url: impl AsRef<str>,
        model: impl Into<String>,
    ) -> Result<Self> {
        Self::with_provider(api_key.into(), base_url.as_ref(), model.into(), "OpenAI")
    }

    /// Create a generator for Groq's `llama-3.3-70b-versatile`.
    pub fn groq(api_key: impl Into<String>) -> Result<Self> {
        Self::with_provider(api_key.into(), GROQ_BASE_URL, DEFAULT_GROQ_MODEL.into(), "Groq")
    }

    fn with_provider(
        api_key: String,
        base_url: &str,
        model: String,
        provider: &str,
    ) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(api_key, base_url, provider, DEFAULT_TIMEOUT)?,
            model,
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.api.http = build_http(timeout, &self.api.provider)?;
        Ok(self)
    }

    fn service_error(&self, message: impl Into<String>) -> RagError {
        RagError::GenerationServiceError {
            provider: self.api.provider.clone(),
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// The text of the first choice, if the service produced one.
fn first_completion(response: ChatResponse) -> Option<String> {
    response.choices.into_iter().next().and_then(|choice| choice.message.content)
}

#[async_trait]
impl TextGenerator for OpenAIChatGenerator {
    fn name(&self) -> &str {
        &self.api.provider
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(
            provider = %self.api.provider,
            model = %self.model,
            prompt_len = prompt.len(),
            "chat completion"
        );

        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: self.temperature,
        };
        let response: ChatResponse =
            self.api.post("chat/completions", &request).await.map_err(|m| self.service_error(m))?;
        first_completion(response).ok_or_else(|| self.service_error("API returned no completion"))
    }
}

#[cfg(all(test, feature = "openai"))]
mod tests {
    use super::*;
    use crate::embedding::l2_norm;

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(OpenAIEmbeddingProvider::new(""), Err(RagError::ConfigError(_))));
        assert!(matches!(OpenAIChatGenerator::groq("  "), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn base_url_loses_trailing_slashes() {
        let provider = OpenAIEmbeddingProvider::new("sk-test")
            .unwrap()
            .with_base_url("http://localhost:8080/v1//");
        assert_eq!(provider.api.base_url, "http://localhost:8080/v1");

        let generator =
            OpenAIChatGenerator::compatible("key", "http://localhost:8080/v1/", "local").unwrap();
        assert_eq!(generator.api.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn requested_dimensions_are_reported() {
        let provider = OpenAIEmbeddingProvider::new("sk-test").unwrap();
        assert_eq!(provider.dimensions(), DEFAULT_EMBEDDING_DIMENSIONS);
        assert_eq!(provider.request_dimensions, None);

        let provider = provider.with_dimensions(384);
        assert_eq!(provider.dimensions(), 384);
        assert_eq!(provider.request_dimensions, Some(384));
    }

    #[test]
    fn embedding_request_omits_unset_dimensions() {
        let request = EmbeddingRequest { model: "m", input: &["Scope 1"], dimensions: None };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("dimensions").is_none());
        assert_eq!(json["input"][0], "Scope 1");
    }

    #[test]
    fn out_of_order_embeddings_are_reordered_and_normalized() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"data": [
                {"index": 1, "embedding": [0.0, 2.0]},
                {"index": 0, "embedding": [3.0, 4.0]}
            ]}"#,
        )
        .unwrap();

        let embeddings = into_embeddings(response, 2).unwrap();
        assert_eq!(embeddings[0], vec![0.6, 0.8]);
        assert_eq!(embeddings[1], vec![0.0, 1.0]);
        assert!(embeddings.iter().all(|e| (l2_norm(e) - 1.0).abs() < 1e-6));
    }

    #[test]
    fn short_embedding_reply_is_an_error() {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#).unwrap();
        assert!(into_embeddings(response, 2).is_err());
    }

    #[test]
    fn api_error_body_yields_its_message() {
        let body = r#"{"error": {"message": "rate limit reached", "type": "tokens"}}"#;
        assert_eq!(error_detail(body.to_string()), "rate limit reached");
        assert_eq!(error_detail("bad gateway".to_string()), "bad gateway");
    }

    #[test]
    fn first_choice_content_is_the_completion() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "Scope 2."}}]}"#,
        )
        .unwrap();
        assert_eq!(first_completion(response).as_deref(), Some("Scope 2."));

        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(first_completion(empty), None);
    }

    #[test]
    fn groq_generator_uses_groq_defaults() {
        let generator = OpenAIChatGenerator::groq("gsk-test").unwrap();
        assert_eq!(generator.name(), "Groq");
        assert_eq!(generator.api.base_url, GROQ_BASE_URL);
        assert_eq!(generator.model, DEFAULT_GROQ_MODEL);
        assert_eq!(generator.temperature, 0.3);
    }
}
