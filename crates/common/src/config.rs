use crate::error::ChunkwiseError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix (e.g. `CHUNKWISE_LLM_MODEL`)
pub const ENV_PREFIX: &str = "CHUNKWISE";

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "chunkwise.toml";

/// Chunkwise application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// OpenAI-compatible API base URL
    pub openai_base_url: String,

    /// Completion model name
    pub llm_model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Credential store (one API key per line)
    pub apikey_file: PathBuf,

    /// Log file path
    pub log_file: PathBuf,

    /// Log level
    pub log_level: String,

    /// Output directory for book chunk artifacts
    pub split_dir: PathBuf,

    /// Output directory for meeting chunk artifacts
    pub meeting_split_dir: PathBuf,

    /// Output directory for turn artifacts
    pub history_dir: PathBuf,

    /// Token budget per book chunk
    pub book_max_tokens: usize,

    /// Token budget per meeting chunk
    pub meeting_max_tokens: usize,

    /// Timeout for a single completion/embedding call
    pub request_timeout_secs: u64,

    /// Attempts per request on transient failures
    pub max_transient_attempts: u32,

    /// First backoff delay, doubled on each further attempt
    pub retry_base_delay_ms: u64,

    /// Documents processed concurrently
    pub jobs: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "text-davinci-003".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            apikey_file: PathBuf::from("./config/apikey.txt"),
            log_file: PathBuf::from("./logs/book.summary.log.txt"),
            log_level: "info".to_string(),
            split_dir: PathBuf::from("./logs/book_split"),
            meeting_split_dir: PathBuf::from("./logs/meeting_split"),
            history_dir: PathBuf::from("./history/book-sum"),
            book_max_tokens: 3000,
            meeting_max_tokens: 2800,
            request_timeout_secs: 120,
            max_transient_attempts: 3,
            retry_base_delay_ms: 1000,
            jobs: 1,
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then the optional config file, then
    /// `CHUNKWISE_*` environment variables. `.env` is loaded by the binary
    /// before this runs.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ChunkwiseError> {
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|e| ChunkwiseError::config(format!("Invalid defaults: {}", e)))?;
        let file = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config: Self = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::from(file.as_path()).required(config_file.is_some()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| {
                ChunkwiseError::config(format!("Failed to load configuration: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// First retry delay as a duration
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ChunkwiseError> {
        if !self.openai_base_url.starts_with("http://")
            && !self.openai_base_url.starts_with("https://")
        {
            return Err(ChunkwiseError::config(
                "OpenAI base URL must start with http:// or https://",
            ));
        }

        if self.llm_model.is_empty() || self.embedding_model.is_empty() {
            return Err(ChunkwiseError::config("Model names cannot be empty"));
        }

        if self.book_max_tokens == 0 || self.meeting_max_tokens == 0 {
            return Err(ChunkwiseError::config("Token budgets must be positive"));
        }

        if self.max_transient_attempts == 0 {
            return Err(ChunkwiseError::config(
                "max_transient_attempts must be at least 1",
            ));
        }

        if self.jobs == 0 {
            return Err(ChunkwiseError::config("jobs must be at least 1"));
        }

        Ok(())
    }
}
