//! Rotating pool of API credentials.
//!
//! Quota and invalid-credential failures deprecate the credential in use and
//! move on to the next one; transient failures retry the same credential
//! with exponential backoff up to a ceiling. The surviving credentials are
//! written back to the store once, at shutdown.

use chunkwise_common::logger::mask_credential;
use chunkwise_common::{storage, AppConfig, ChunkwiseError, Result, ServiceErrorKind};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::service::CompletionService;

/// Backoff never grows past `base_delay * 2^MAX_BACKOFF_EXPONENT`
const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Prompt used to probe whether a credential still works
const PROBE_PROMPT: &str = "Tell me your name.";

/// Credential state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Active,
    /// Never selected again during this run
    Deprecated,
}

/// API credential tracked by the pool
#[derive(Debug, Clone)]
pub struct Credential {
    /// Token string (also the credential's identity)
    pub token: String,

    /// Current state
    pub state: CredentialState,

    /// Transient failures since the last success on this credential,
    /// across all requests. Informational; retry decisions count attempts
    /// per request.
    pub consecutive_failures: u32,
}

impl Credential {
    fn new(token: String) -> Self {
        Self {
            token,
            state: CredentialState::Active,
            consecutive_failures: 0,
        }
    }

    fn is_active(&self) -> bool {
        self.state == CredentialState::Active
    }
}

/// Retry behaviour for requests issued through the pool
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Transient failures tolerated per request
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Timeout enforced on every single call
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Build from application config
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.max_transient_attempts,
            base_delay: config.retry_base_delay(),
            request_timeout: config.request_timeout(),
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay * 2u32.pow(exponent)
    }
}

/// What the caller should do after a reported failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureAction {
    /// Credential deprecated; retry the request with `next`
    Rotate { next: String },

    /// Retry the same credential after `delay`
    RetryAfter { delay: Duration, attempt: u32 },

    /// Do not retry
    GiveUp,
}

struct PoolState {
    credentials: Vec<Credential>,
    cursor: usize,
}

impl PoolState {
    /// First active credential at or after `start`, wrapping around
    fn next_active_from(&self, start: usize) -> Option<usize> {
        let len = self.credentials.len();
        (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&idx| self.credentials[idx].is_active())
    }

    fn position(&self, token: &str) -> Option<usize> {
        self.credentials.iter().position(|c| c.token == token)
    }
}

/// Shared pool of credentials; pass it by `Arc` to everything that issues
/// requests
pub struct CredentialPool {
    state: Mutex<PoolState>,
    store_path: Option<PathBuf>,
    policy: RetryPolicy,
}

impl CredentialPool {
    /// Create a pool from an ordered credential list (rotation order)
    pub fn new(tokens: Vec<String>, policy: RetryPolicy) -> Result<Self> {
        if tokens.is_empty() {
            return Err(ChunkwiseError::config("No credentials provided"));
        }

        info!("Credential pool initialized with {} credentials", tokens.len());
        Ok(Self {
            state: Mutex::new(PoolState {
                credentials: tokens.into_iter().map(Credential::new).collect(),
                cursor: 0,
            }),
            store_path: None,
            policy,
        })
    }

    /// Load credentials from a store file (one token per line); the
    /// survivors are written back there by `remove_deprecated_keys`
    pub fn load(path: &Path, policy: RetryPolicy) -> Result<Self> {
        if !path.exists() {
            return Err(ChunkwiseError::config(format!(
                "Credential store {} not found. Put your API keys in it, one per line.",
                path.display()
            )));
        }

        let tokens = storage::read_lines(path).map_err(|e| {
            ChunkwiseError::credential_store(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut pool = Self::new(tokens, policy)?;
        pool.store_path = Some(path.to_path_buf());
        Ok(pool)
    }

    /// Retry policy used by `execute`
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // The state stays consistent between statements, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Credential at the cursor, skipping deprecated ones
    pub fn acquire(&self) -> Result<String> {
        let mut state = self.lock();
        let idx = state
            .next_active_from(state.cursor)
            .ok_or(ChunkwiseError::CredentialsExhausted)?;
        state.cursor = idx;
        Ok(state.credentials[idx].token.clone())
    }

    /// Reset the transient failure count of a credential
    pub fn report_success(&self, token: &str) {
        let mut state = self.lock();
        if let Some(idx) = state.position(token) {
            state.credentials[idx].consecutive_failures = 0;
        }
    }

    /// Record a failed request and decide how the caller should continue.
    ///
    /// `attempt` is the number of transient failures the request itself has
    /// seen so far, this one included; it is ignored for other kinds.
    pub fn report_failure(
        &self,
        token: &str,
        kind: ServiceErrorKind,
        attempt: u32,
    ) -> Result<FailureAction> {
        let mut state = self.lock();
        let Some(idx) = state.position(token) else {
            return Err(ChunkwiseError::invalid_input(format!(
                "Unknown credential {}",
                mask_credential(token)
            )));
        };

        match kind {
            ServiceErrorKind::Quota | ServiceErrorKind::InvalidCredential => {
                if state.credentials[idx].is_active() {
                    state.credentials[idx].state = CredentialState::Deprecated;
                    warn!(
                        "Credential {} deprecated ({})",
                        mask_credential(token),
                        kind
                    );
                }

                let next = state
                    .next_active_from(idx + 1)
                    .ok_or(ChunkwiseError::CredentialsExhausted)?;
                if !state.credentials[state.cursor].is_active() || state.cursor == idx {
                    state.cursor = next;
                }
                let next = state.credentials[state.cursor].token.clone();
                Ok(FailureAction::Rotate { next })
            }
            ServiceErrorKind::Transient => {
                state.credentials[idx].consecutive_failures += 1;
                if attempt >= self.policy.max_attempts {
                    return Ok(FailureAction::GiveUp);
                }
                Ok(FailureAction::RetryAfter {
                    delay: self.policy.backoff(attempt),
                    attempt,
                })
            }
            ServiceErrorKind::Other => Ok(FailureAction::GiveUp),
        }
    }

    /// Tokens not deprecated so far, in original order
    pub fn active_tokens(&self) -> Vec<String> {
        self.lock()
            .credentials
            .iter()
            .filter(|c| c.is_active())
            .map(|c| c.token.clone())
            .collect()
    }

    /// Whether `token` has been deprecated
    pub fn is_deprecated(&self, token: &str) -> bool {
        let state = self.lock();
        state
            .position(token)
            .map(|idx| !state.credentials[idx].is_active())
            .unwrap_or(false)
    }

    /// Drop deprecated credentials and atomically rewrite the store (when
    /// the pool was loaded from one). Returns the survivors.
    pub fn remove_deprecated_keys(&self) -> Result<Vec<String>> {
        let (survivors, total) = {
            let state = self.lock();
            let survivors: Vec<String> = state
                .credentials
                .iter()
                .filter(|c| c.is_active())
                .map(|c| c.token.clone())
                .collect();
            (survivors, state.credentials.len())
        };

        info!(
            "Removing {} deprecated credentials, {} remain",
            total - survivors.len(),
            survivors.len()
        );

        if let Some(path) = &self.store_path {
            let backup = storage::overwrite_lines(path, &survivors).map_err(|e| {
                ChunkwiseError::credential_store(format!(
                    "Failed to rewrite credential store {}: {}",
                    path.display(),
                    e
                ))
            })?;
            if let Some(backup) = backup {
                info!("Previous credential store kept at {}", backup.display());
            }
        }

        Ok(survivors)
    }

    /// Run `op` with a pooled credential, rotating on quota/invalid-credential
    /// failures and backing off on transient ones. Each call is bounded by
    /// the policy's request timeout; a timeout counts as transient.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut transient_failures = 0;
        loop {
            let token = self.acquire()?;
            debug!("{} using credential {}", label, mask_credential(&token));

            let outcome = match tokio::time::timeout(self.policy.request_timeout, op(token.clone())).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ChunkwiseError::transient(format!(
                    "{} timed out after {:?}",
                    label, self.policy.request_timeout
                ))),
            };

            let err = match outcome {
                Ok(value) => {
                    self.report_success(&token);
                    return Ok(value);
                }
                Err(err) => err,
            };

            let Some(kind) = err.service_kind() else {
                return Err(err);
            };

            if kind == ServiceErrorKind::Transient {
                transient_failures += 1;
            }

            match self.report_failure(&token, kind, transient_failures)? {
                FailureAction::Rotate { next } => {
                    warn!(
                        "{} failed on {} ({}), rotating to {}",
                        label,
                        mask_credential(&token),
                        err,
                        mask_credential(&next)
                    );
                }
                FailureAction::RetryAfter { delay, attempt } => {
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        label, attempt, self.policy.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                FailureAction::GiveUp if kind == ServiceErrorKind::Transient => {
                    return Err(ChunkwiseError::TransientRetriesExhausted {
                        attempts: self.policy.max_attempts,
                        message: err.to_string(),
                    });
                }
                FailureAction::GiveUp => return Err(err),
            }
        }
    }
}

/// Probe every token with a short prompt and return those that answered,
/// in their original order
pub async fn validate_credentials<S>(service: &S, tokens: &[String], timeout: Duration) -> Vec<String>
where
    S: CompletionService + ?Sized,
{
    let mut valid = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        match tokio::time::timeout(timeout, service.complete(token, PROBE_PROMPT)).await {
            Ok(Ok(output)) => {
                info!(
                    "index: {}, {} is valid. output: {}",
                    i,
                    mask_credential(token),
                    output.trim()
                );
                valid.push(token.clone());
            }
            Ok(Err(e)) => warn!("index: {}, {} is invalid: {}", i, mask_credential(token), e),
            Err(_) => warn!("index: {}, {} timed out", i, mask_credential(token)),
        }
    }
    valid
}
