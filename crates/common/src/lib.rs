pub mod config;
pub mod error;
pub mod logger;
pub mod storage;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{ChunkwiseError, ServiceErrorKind};
pub type Result<T> = std::result::Result<T, ChunkwiseError>;
