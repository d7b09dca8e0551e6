use async_trait::async_trait;
use chunkwise_common::Result;

/// Capability interface of the remote language-model service.
///
/// Implementations are plain call wrappers: no retries, no credential
/// rotation. Failures come back as `ChunkwiseError::Service` with a
/// `ServiceErrorKind` so the credential pool can classify them.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Completion model identifier
    fn model(&self) -> &str;

    /// Number of tokens `text` occupies for this model
    fn tokenize(&self, text: &str) -> usize;

    /// Complete a prompt using the given credential
    async fn complete(&self, credential: &str, prompt: &str) -> Result<String>;

    /// Embed text using the given credential
    async fn embed(&self, credential: &str, text: &str) -> Result<Vec<f32>>;
}
