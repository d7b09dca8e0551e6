use crate::error::ChunkwiseError;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Initialize logging system
///
/// Sets up logging to both console and file
///
/// # Arguments
/// * `log_file_path` - File that run logs are appended to
/// * `log_level` - Log level (trace, debug, info, warn, error)
pub fn setup_logging(log_file_path: &Path, log_level: &str) -> Result<(), ChunkwiseError> {
    if let Some(log_dir) = log_file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(log_dir).map_err(|e| {
            ChunkwiseError::config(format!(
                "Failed to create log directory {}: {}",
                log_dir.display(),
                e
            ))
        })?;
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .map_err(|e| {
            ChunkwiseError::config(format!(
                "Failed to open log file {}: {}",
                log_file_path.display(),
                e
            ))
        })?;

    // Environment filter setup (RUST_LOG env var takes precedence)
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_filter(env_filter.clone());

    // Prompts and summaries only go to the file
    let file_layer = fmt::layer()
        .with_writer(log_file)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ChunkwiseError::config(format!("Failed to initialize logging: {}", e)))?;

    tracing::info!(
        "Logging initialized: level={}, log_file={}",
        log_level,
        log_file_path.display()
    );

    Ok(())
}

/// Simple logging setup (console only)
///
/// Used by commands that do not write a run log
pub fn setup_console_logging(log_level: &str) -> Result<(), ChunkwiseError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|e| ChunkwiseError::config(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Log-safe fingerprint of a credential: its last four characters plus a
/// short SHA-256 prefix, so keys can be told apart without being revealed
pub fn mask_credential(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let fingerprint = hex::encode(&digest[..4]);
    let tail: String = {
        let chars: Vec<char> = token.chars().collect();
        let start = chars.len().saturating_sub(4);
        chars[start..].iter().collect()
    };
    format!("...{}#{}", tail, fingerprint)
}
