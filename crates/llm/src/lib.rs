//! Chunkwise LLM Integration
//!
//! OpenAI-compatible client, token-budget splitting, credential pool and
//! incremental summarization sessions

mod chunking;
mod client;
mod credentials;
mod document;
mod pipeline;
mod prompts;
mod service;
mod session;
mod tokenizer;
mod types;

#[cfg(test)]
mod testing;

pub use chunking::{
    detect_language, write_chunk_artifacts, Chunk, Language, TokenBudgetSplitter, Utterance,
    CJK_DELIMITER, LATIN_DELIMITER, LATIN_RATIO_THRESHOLD,
};
pub use client::{classify_response, ModelEndpoint, OpenAiClient};
pub use credentials::{
    validate_credentials, Credential, CredentialPool, CredentialState, FailureAction, RetryPolicy,
};
pub use document::{decode_document, read_document, DecodedDocument};
pub use pipeline::{
    split_document, DocumentKind, DocumentPipeline, DocumentReport, DocumentStatus, RunReport,
};
pub use prompts::{prompt_builder, prompt_builder_for, PromptBuilder};
pub use service::CompletionService;
pub use session::{MemoryMode, SessionState, SummarizationSession, Turn};
pub use tokenizer::Tokenizer;
pub use types::{ApiErrorBody, ApiErrorDetail, EmbedRequest, EmbedResponse};
