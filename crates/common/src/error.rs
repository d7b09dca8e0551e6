use std::fmt;

/// Classification of a completion service failure.
///
/// Decided once by the adapter that talks to the remote service, so that
/// callers never inspect free-text error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Network error, timeout, rate limit or server-side failure
    Transient,
    /// Account quota exhausted for this credential
    Quota,
    /// Credential rejected by the service
    InvalidCredential,
    /// Anything else (bad request, malformed response, ...)
    Other,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::Quota => "quota-exceeded",
            Self::InvalidCredential => "invalid-credential",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Chunkwise error types
#[derive(Debug, thiserror::Error)]
pub enum ChunkwiseError {
    /// Document bytes could not be decoded
    #[error("Unknown encoding: {0}")]
    UnknownEncoding(String),

    /// Completion service failure, already classified
    #[error("Service error ({kind}): {message}")]
    Service {
        kind: ServiceErrorKind,
        message: String,
    },

    /// Transient failures kept happening past the retry ceiling
    #[error("Transient service error after {attempts} attempts: {message}")]
    TransientRetriesExhausted { attempts: u32, message: String },

    /// Every credential in the pool has been deprecated
    #[error("All credentials are exhausted")]
    CredentialsExhausted,

    /// Previous turn requested while the history is empty
    #[error("No summarization history available")]
    NoHistory,

    /// Processing stopped at a turn boundary by the caller
    #[error("Cancelled")]
    Cancelled,

    /// Session state machine misuse
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system error
    #[error("File system error: {0}")]
    FileSystem(String),

    /// Credential store could not be read back or rewritten
    #[error("Credential store error: {0}")]
    CredentialStore(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error (anyhow integration)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChunkwiseError {
    /// Create classified service error
    pub fn service<S: Into<String>>(kind: ServiceErrorKind, msg: S) -> Self {
        Self::Service {
            kind,
            message: msg.into(),
        }
    }

    /// Create transient service error
    pub fn transient<S: Into<String>>(msg: S) -> Self {
        Self::service(ServiceErrorKind::Transient, msg)
    }

    /// Create config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create file system error
    pub fn file_system<S: Into<String>>(msg: S) -> Self {
        Self::FileSystem(msg.into())
    }

    /// Create credential store error
    pub fn credential_store<S: Into<String>>(msg: S) -> Self {
        Self::CredentialStore(msg.into())
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Service classification, if this error came from the completion service
    pub fn service_kind(&self) -> Option<ServiceErrorKind> {
        match self {
            Self::Service { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this error must stop the whole run rather than a single document
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::CredentialsExhausted | Self::Config(_) | Self::CredentialStore(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_kind() {
        let err = ChunkwiseError::service(ServiceErrorKind::Quota, "quota");
        assert_eq!(err.service_kind(), Some(ServiceErrorKind::Quota));
        assert_eq!(ChunkwiseError::NoHistory.service_kind(), None);
    }

    #[test]
    fn test_run_fatal() {
        assert!(ChunkwiseError::CredentialsExhausted.is_run_fatal());
        assert!(!ChunkwiseError::transient("timeout").is_run_fatal());
        assert!(!ChunkwiseError::TransientRetriesExhausted {
            attempts: 3,
            message: "timeout".into()
        }
        .is_run_fatal());
        assert!(ChunkwiseError::credential_store("read-only").is_run_fatal());
    }

    #[test]
    fn test_artifact_write_failures_are_document_local() {
        assert!(!ChunkwiseError::file_system("cannot create dir").is_run_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!ChunkwiseError::from(io).is_run_fatal());
    }

    #[test]
    fn test_display() {
        let err = ChunkwiseError::service(ServiceErrorKind::InvalidCredential, "401");
        assert_eq!(err.to_string(), "Service error (invalid-credential): 401");
    }
}
