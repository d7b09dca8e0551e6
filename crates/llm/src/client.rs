use async_trait::async_trait;
use chunkwise_common::{ChunkwiseError, Result, ServiceErrorKind};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::service::CompletionService;
use crate::tokenizer::Tokenizer;
use crate::types::{
    ApiErrorBody, ChatMessage, ChatRequest, ChatResponse, CompletionRequest, CompletionResponse,
    EmbedRequest, EmbedResponse,
};

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 300;

/// Which endpoint a completion model is served from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelEndpoint {
    /// `/chat/completions` (gpt-3.5-turbo, gpt-4, ...)
    Chat,
    /// `/completions` (text-davinci-003 and other legacy models)
    Completion,
}

impl ModelEndpoint {
    /// Pick the endpoint from the model name
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("text-") || model.contains("davinci") || model.contains("instruct") {
            Self::Completion
        } else {
            Self::Chat
        }
    }
}

/// OpenAI-compatible API client
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: String,
    client: Client,
    model: String,
    embedding_model: String,
    endpoint: ModelEndpoint,
    tokenizer: Tokenizer,
}

impl OpenAiClient {
    /// Create new OpenAI client
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        let tokenizer = Tokenizer::for_model(&model)?;
        let endpoint = ModelEndpoint::for_model(&model);

        info!(
            "OpenAI client initialized: {} (model={}, endpoint={:?})",
            base_url, model, endpoint
        );
        Ok(Self {
            base_url,
            client,
            model,
            embedding_model: embedding_model.into(),
            endpoint,
            tokenizer,
        })
    }

    /// Endpoint used for completions
    pub fn endpoint(&self) -> ModelEndpoint {
        self.endpoint
    }

    async fn complete_chat(&self, credential: &str, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: None,
        };

        let response: ChatResponse = self.post_json("chat/completions", credential, &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ChunkwiseError::service(ServiceErrorKind::Other, "No choices in chat response"))
    }

    async fn complete_legacy(&self, credential: &str, prompt: &str) -> Result<String> {
        let request = CompletionRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            max_tokens: 1000,
            temperature: None,
            stop: vec!["###".to_string()],
        };

        let response: CompletionResponse = self.post_json("completions", credential, &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| {
                ChunkwiseError::service(ServiceErrorKind::Other, "No choices in completion response")
            })
    }

    /// Single POST, classifying every failure
    async fn post_json<B, R>(&self, path: &str, credential: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport_error(path, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let kind = classify_response(status, &body);
            let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(ChunkwiseError::service(
                kind,
                format!("{} returned {}: {}", path, status, snippet),
            ));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| classify_transport_error(path, e))
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn tokenize(&self, text: &str) -> usize {
        self.tokenizer.count_tokens(text)
    }

    async fn complete(&self, credential: &str, prompt: &str) -> Result<String> {
        debug!(
            "Sending completion request - Model: {}, Prompt length: {}",
            self.model,
            prompt.len()
        );

        let text = match self.endpoint {
            ModelEndpoint::Chat => self.complete_chat(credential, prompt).await?,
            ModelEndpoint::Completion => self.complete_legacy(credential, prompt).await?,
        };

        if text.trim().is_empty() {
            return Err(ChunkwiseError::service(
                ServiceErrorKind::Other,
                "Empty completion from service",
            ));
        }

        debug!("Received completion - Length: {}", text.len());
        Ok(text)
    }

    async fn embed(&self, credential: &str, text: &str) -> Result<Vec<f32>> {
        debug!(
            "Generating embedding - Model: {}, Text length: {}",
            self.embedding_model,
            text.len()
        );

        let request = EmbedRequest {
            model: self.embedding_model.clone(),
            input: text.to_string(),
        };

        let response: EmbedResponse = self.post_json("embeddings", credential, &request).await?;
        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .unwrap_or_default();

        if embedding.is_empty() {
            return Err(ChunkwiseError::service(
                ServiceErrorKind::Other,
                "Empty embedding from service",
            ));
        }

        debug!("Received embedding - Dimension: {}", embedding.len());
        Ok(embedding)
    }
}

/// Classify a non-2xx response by status and the API's structured error code
pub fn classify_response(status: StatusCode, body: &str) -> ServiceErrorKind {
    let detail = serde_json::from_str::<ApiErrorBody>(body).ok().map(|b| b.error);
    let code = detail
        .as_ref()
        .and_then(|d| d.code.as_deref().or(d.error_type.as_deref()));

    match (status.as_u16(), code) {
        (_, Some("insufficient_quota")) => ServiceErrorKind::Quota,
        (_, Some("invalid_api_key")) | (401, _) | (403, _) => ServiceErrorKind::InvalidCredential,
        (408, _) | (409, _) | (429, _) => ServiceErrorKind::Transient,
        (s, _) if s >= 500 => ServiceErrorKind::Transient,
        _ => ServiceErrorKind::Other,
    }
}

/// Classify a reqwest failure (no usable HTTP status)
fn classify_transport_error(path: &str, e: reqwest::Error) -> ChunkwiseError {
    let kind = if e.is_timeout() || e.is_connect() || e.is_body() {
        ServiceErrorKind::Transient
    } else {
        ServiceErrorKind::Other
    };
    ChunkwiseError::service(kind, format!("{} request failed: {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_for_model() {
        assert_eq!(ModelEndpoint::for_model("text-davinci-003"), ModelEndpoint::Completion);
        assert_eq!(ModelEndpoint::for_model("gpt-3.5-turbo-instruct"), ModelEndpoint::Completion);
        assert_eq!(ModelEndpoint::for_model("gpt-3.5-turbo"), ModelEndpoint::Chat);
        assert_eq!(ModelEndpoint::for_model("gpt-4"), ModelEndpoint::Chat);
    }

    #[test]
    fn test_classify_quota() {
        let body = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","code":"insufficient_quota"}}"#;
        assert_eq!(classify_response(StatusCode::TOO_MANY_REQUESTS, body), ServiceErrorKind::Quota);
    }

    #[test]
    fn test_classify_rate_limit_is_transient() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests","code":"rate_limit_exceeded"}}"#;
        assert_eq!(
            classify_response(StatusCode::TOO_MANY_REQUESTS, body),
            ServiceErrorKind::Transient
        );
    }

    #[test]
    fn test_classify_invalid_key() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        assert_eq!(
            classify_response(StatusCode::UNAUTHORIZED, body),
            ServiceErrorKind::InvalidCredential
        );
        assert_eq!(
            classify_response(StatusCode::FORBIDDEN, "not json"),
            ServiceErrorKind::InvalidCredential
        );
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(
            classify_response(StatusCode::BAD_GATEWAY, ""),
            ServiceErrorKind::Transient
        );
        assert_eq!(
            classify_response(StatusCode::BAD_REQUEST, r#"{"error":{"message":"too long"}}"#),
            ServiceErrorKind::Other
        );
    }

    #[test]
    fn test_client_creation() {
        let client = OpenAiClient::new(
            "http://localhost:8080/v1/",
            "gpt-3.5-turbo",
            "text-embedding-ada-002",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.model(), "gpt-3.5-turbo");
        assert_eq!(client.endpoint(), ModelEndpoint::Chat);
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }
}
