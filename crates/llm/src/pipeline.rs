use chunkwise_common::{storage, AppConfig, ChunkwiseError, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::chunking::{detect_language, write_chunk_artifacts, Chunk, TokenBudgetSplitter, Utterance};
use crate::credentials::CredentialPool;
use crate::document::read_document;
use crate::service::CompletionService;
use crate::session::{MemoryMode, SummarizationSession};

/// Kind of input document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Plain text book, any encoding
    Book,
    /// Meeting transcript: JSON array of `{speaker, text}` utterances
    Meeting,
}

impl DocumentKind {
    fn artifact_prefix(self) -> &'static str {
        match self {
            Self::Book => "book-summary",
            Self::Meeting => "meeting-summary",
        }
    }
}

/// Outcome of one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStatus {
    Completed,
    /// Stopped at a turn boundary
    Cancelled,
    /// Failed; `run_fatal` errors stop the remaining documents
    Failed { error: String, run_fatal: bool },
    /// Never started
    Skipped,
}

/// Per-document result
#[derive(Debug, Clone)]
pub struct DocumentReport {
    /// Input path
    pub path: PathBuf,

    /// Outcome
    pub status: DocumentStatus,

    /// Turns written to the artifact
    pub turns: usize,

    /// Turn artifact, when one was written
    pub artifact: Option<PathBuf>,
}

impl DocumentReport {
    fn new(path: &Path, status: DocumentStatus) -> Self {
        Self {
            path: path.to_path_buf(),
            status,
            turns: 0,
            artifact: None,
        }
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// One entry per input, in input order
    pub documents: Vec<DocumentReport>,
}

impl RunReport {
    fn count(&self, pred: impl Fn(&DocumentStatus) -> bool) -> usize {
        self.documents.iter().filter(|d| pred(&d.status)).count()
    }

    pub fn completed(&self) -> usize {
        self.count(|s| *s == DocumentStatus::Completed)
    }

    /// Failed or cancelled documents
    pub fn aborted(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Failed { .. } | DocumentStatus::Cancelled))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| *s == DocumentStatus::Skipped)
    }

    /// First run-fatal error, if any
    pub fn fatal_error(&self) -> Option<&str> {
        self.documents.iter().find_map(|d| match &d.status {
            DocumentStatus::Failed { error, run_fatal: true } => Some(error.as_str()),
            _ => None,
        })
    }

    fn log_summary(&self) {
        info!(
            "Run finished: {} completed, {} aborted, {} skipped",
            self.completed(),
            self.aborted(),
            self.skipped()
        );
        for doc in &self.documents {
            info!("  {} -> {:?} ({} turns)", doc.path.display(), doc.status, doc.turns);
        }
    }
}

/// Splits documents and summarizes them through a shared credential pool
pub struct DocumentPipeline<S: ?Sized> {
    config: AppConfig,
    service: Arc<S>,
    pool: Arc<CredentialPool>,
}

impl<S> DocumentPipeline<S>
where
    S: CompletionService + ?Sized,
{
    /// Create new pipeline
    pub fn new(config: AppConfig, service: Arc<S>, pool: Arc<CredentialPool>) -> Self {
        Self { config, service, pool }
    }

    /// Summarize plain-text books
    pub async fn summarize_books(
        &self,
        paths: &[PathBuf],
        mode: MemoryMode,
        cancel: &CancellationToken,
    ) -> RunReport {
        self.summarize(paths, DocumentKind::Book, mode, cancel).await
    }

    /// Summarize meeting transcripts
    pub async fn summarize_meetings(
        &self,
        paths: &[PathBuf],
        mode: MemoryMode,
        cancel: &CancellationToken,
    ) -> RunReport {
        self.summarize(paths, DocumentKind::Meeting, mode, cancel).await
    }

    /// Summarize documents, up to `config.jobs` at a time. A run-fatal
    /// error (credential exhaustion, configuration) cancels the documents in
    /// flight at their next turn boundary and skips the rest.
    pub async fn summarize(
        &self,
        paths: &[PathBuf],
        kind: DocumentKind,
        mode: MemoryMode,
        cancel: &CancellationToken,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", id = %run_id);

        async {
            info!(
                "Summarizing {} {:?} documents (model={}, mode={:?}, jobs={})",
                paths.len(),
                kind,
                self.service.model(),
                mode,
                self.config.jobs
            );

            let run_cancel = cancel.child_token();
            let mut reports: Vec<(usize, DocumentReport)> = futures::stream::iter(paths.iter().enumerate())
                .map(|(i, path)| {
                    let run_cancel = &run_cancel;
                    async move {
                        if run_cancel.is_cancelled() {
                            warn!("Skipping {}", path.display());
                            return (i, DocumentReport::new(path, DocumentStatus::Skipped));
                        }

                        let report = self.summarize_document(path, kind, mode, run_cancel).await;
                        if let DocumentStatus::Failed { run_fatal: true, .. } = report.status {
                            run_cancel.cancel();
                        }
                        (i, report)
                    }
                })
                .buffer_unordered(self.config.jobs.max(1))
                .collect()
                .await;

            reports.sort_by_key(|(i, _)| *i);
            let report = RunReport {
                documents: reports.into_iter().map(|(_, r)| r).collect(),
            };
            report.log_summary();
            report
        }
        .instrument(span)
        .await
    }

    async fn summarize_document(
        &self,
        path: &Path,
        kind: DocumentKind,
        mode: MemoryMode,
        cancel: &CancellationToken,
    ) -> DocumentReport {
        let name = document_name(path);
        let span = info_span!("document", name = %name);

        async {
            info!("※※※ Begin summarize: {} ※※※", name);

            let chunks = match split_document(&self.config, self.service.as_ref(), path, kind).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    error!("Failed to prepare {}: {}", name, e);
                    return DocumentReport::new(path, failed(&e));
                }
            };

            let mut session = SummarizationSession::new(self.service.clone(), self.pool.clone());
            let (turns, outcome) = match session.process(&chunks, mode, cancel).await {
                Ok(turns) => (turns, None),
                Err(e) => (session.flush(), Some(e)),
            };

            let mut report = DocumentReport::new(path, DocumentStatus::Completed);
            if outcome.is_none() || !turns.is_empty() {
                let artifact = self.turn_artifact_path(path, kind, mode);
                match storage::save_json_file(&artifact, &turns) {
                    Ok(()) => {
                        report.turns = turns.len();
                        report.artifact = Some(artifact);
                    }
                    Err(e) => {
                        error!("Failed to save turns of {}: {}", name, e);
                        return DocumentReport::new(path, failed(&e));
                    }
                }
            }

            report.status = match outcome {
                None => {
                    info!("Completed {}: {} turns", name, report.turns);
                    DocumentStatus::Completed
                }
                Some(ChunkwiseError::Cancelled) => {
                    warn!("Cancelled {} after {} turns", name, report.turns);
                    DocumentStatus::Cancelled
                }
                Some(e) => {
                    error!("Aborted {} after {} turns: {}", name, report.turns, e);
                    failed(&e)
                }
            };
            report
        }
        .instrument(span)
        .await
    }

    fn turn_artifact_path(&self, path: &Path, kind: DocumentKind, mode: MemoryMode) -> PathBuf {
        self.config.history_dir.join(format!(
            "{}-{}-{}{}.json",
            kind.artifact_prefix(),
            document_name(path),
            self.service.model(),
            mode.artifact_suffix()
        ))
    }
}

/// Read a document, split it under the configured token budget and write
/// its chunk artifacts. Books go to `split_dir`, meetings to
/// `meeting_split_dir`.
pub async fn split_document<S>(
    config: &AppConfig,
    service: &S,
    path: &Path,
    kind: DocumentKind,
) -> Result<Vec<Chunk>>
where
    S: CompletionService + ?Sized,
{
    let name = document_name(path);

    let (chunks, split_dir) = match kind {
        DocumentKind::Book => {
            let document = read_document(path).await?;
            let language = detect_language(&document.text);
            info!("{}: {:?}, {} chars", name, language, document.text.len());
            let splitter = TokenBudgetSplitter::new(config.book_max_tokens);
            (splitter.split(&document.text, language, service), &config.split_dir)
        }
        DocumentKind::Meeting => {
            let data = tokio::fs::read_to_string(path).await.map_err(|e| {
                ChunkwiseError::invalid_input(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let utterances: Vec<Utterance> = serde_json::from_str(&data)?;
            let splitter = TokenBudgetSplitter::new(config.meeting_max_tokens);
            (splitter.split_meeting(&utterances, service), &config.meeting_split_dir)
        }
    };

    let (json_path, _) = write_chunk_artifacts(split_dir, &name, service.model(), &chunks)?;
    info!("{}: {} chunks written to {}", name, chunks.len(), json_path.display());

    Ok(chunks)
}

fn failed(e: &ChunkwiseError) -> DocumentStatus {
    DocumentStatus::Failed {
        error: e.to_string(),
        run_fatal: e.is_run_fatal(),
    }
}

fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
