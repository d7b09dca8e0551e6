use serde::{Deserialize, Serialize};

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role ("system", "user", "assistant")
    pub role: String,

    /// Message text
    pub content: String,
}

/// `/chat/completions` request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model name (e.g., "gpt-3.5-turbo")
    pub model: String,

    /// Conversation so far
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// `/chat/completions` response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// `/completions` request (legacy completion models)
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    /// Model name (e.g., "text-davinci-003")
    pub model: String,

    /// Prompt text
    pub prompt: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Stop sequences
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

/// `/completions` response
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub text: String,
}

/// `/embeddings` request
#[derive(Debug, Clone, Serialize)]
pub struct EmbedRequest {
    /// Embedding model name
    pub model: String,

    /// Text to embed
    pub input: String,
}

/// `/embeddings` response
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedResponse {
    pub data: Vec<EmbedData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbedData {
    pub embedding: Vec<f32>,
}

/// Error envelope returned by the API on non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: String,

    #[serde(default, rename = "type")]
    pub error_type: Option<String>,

    #[serde(default)]
    pub code: Option<String>,
}
