use chunkwise_common::{ChunkwiseError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::chunking::Chunk;
use crate::credentials::CredentialPool;
use crate::prompts::prompt_builder_for;
use crate::service::CompletionService;

/// Whether turns carry the previous turn's summary forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryMode {
    WithMemory,
    NoMemory,
}

impl MemoryMode {
    /// Suffix appended to turn artifact names
    pub fn artifact_suffix(self) -> &'static str {
        match self {
            Self::WithMemory => "",
            Self::NoMemory => "no_scm",
        }
    }
}

/// Session state; one pass from `Init` to `Done` per document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Empty history
    Init,
    /// First chunk, prompt built from the chunk alone
    FirstTurn,
    /// Later chunk, prompt includes the previous summary
    Continuation,
    /// Any chunk in no-memory mode
    Independent,
    /// All chunks processed
    Done,
}

impl SessionState {
    /// State for the next chunk under `mode`
    pub fn next(self, mode: MemoryMode) -> Result<Self> {
        match (self, mode) {
            (Self::Init, MemoryMode::WithMemory) => Ok(Self::FirstTurn),
            (Self::FirstTurn | Self::Continuation, MemoryMode::WithMemory) => {
                Ok(Self::Continuation)
            }
            (Self::Init | Self::Independent, MemoryMode::NoMemory) => Ok(Self::Independent),
            (Self::Done, _) => Err(ChunkwiseError::invalid_state(
                "document already finished; clear the history first",
            )),
            (state, mode) => Err(ChunkwiseError::invalid_state(format!(
                "cannot continue {:?} in {:?} mode",
                state, mode
            ))),
        }
    }
}

/// One prompt/response exchange for a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// 0-based, contiguous within a document
    pub index: usize,

    /// Prompt sent to the model
    pub input: String,

    /// Model output, whitespace-trimmed
    pub summary: String,

    /// Embedding of the (input, summary) pair
    pub embedding: Vec<f32>,

    /// Chunk text the prompt was built from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_paragraph: Option<String>,
}

impl Turn {
    /// Text form of the exchange, used for the embedding
    pub fn transcript(&self) -> String {
        format!(
            "[Turn {}]\n\nUser: {}\n\nAssistant: {}",
            self.index, self.input, self.summary
        )
    }
}

/// Drives one document's chunks through the model, threading each turn's
/// summary into the next prompt
pub struct SummarizationSession<S: ?Sized> {
    service: Arc<S>,
    pool: Arc<CredentialPool>,
    history: Vec<Turn>,
    state: SessionState,
}

impl<S> SummarizationSession<S>
where
    S: CompletionService + ?Sized,
{
    /// Create new session with empty history
    pub fn new(service: Arc<S>, pool: Arc<CredentialPool>) -> Self {
        Self {
            service,
            pool,
            history: Vec::new(),
            state: SessionState::Init,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Turns completed so far
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Drop all turns and return to `Init`
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.state = SessionState::Init;
    }

    /// Hand over the completed turns and return to `Init`
    pub fn flush(&mut self) -> Vec<Turn> {
        self.state = SessionState::Init;
        std::mem::take(&mut self.history)
    }

    /// Summary of the last completed turn
    pub fn get_previous_summary(&self) -> Result<&str> {
        self.history
            .last()
            .map(|turn| turn.summary.as_str())
            .ok_or(ChunkwiseError::NoHistory)
    }

    /// Summarize a document's chunks in order.
    ///
    /// On success the turns are returned and the session is back in `Init`.
    /// On failure or cancellation the turns completed so far stay in the
    /// history; `flush` hands them over for persistence.
    pub async fn process(
        &mut self,
        chunks: &[Chunk],
        mode: MemoryMode,
        cancel: &CancellationToken,
    ) -> Result<Vec<Turn>> {
        if self.state != SessionState::Init {
            return Err(ChunkwiseError::invalid_state(format!(
                "process called in {:?}; clear the history first",
                self.state
            )));
        }

        let total = chunks.len();
        for chunk in chunks {
            if cancel.is_cancelled() {
                info!(
                    "Cancelled after {}/{} turns",
                    self.history.len(),
                    total
                );
                return Err(ChunkwiseError::Cancelled);
            }
            self.step(chunk, total, mode).await?;
        }

        self.state = SessionState::Done;
        info!("Document finished: {} turns", self.history.len());
        Ok(self.flush())
    }

    async fn step(&mut self, chunk: &Chunk, total: usize, mode: MemoryMode) -> Result<()> {
        let next = self.state.next(mode)?;
        let builder = prompt_builder_for(&chunk.text);
        let input = match next {
            SessionState::FirstTurn => (builder.start)(&chunk.text),
            SessionState::Continuation => {
                (builder.continuation)(self.get_previous_summary()?, &chunk.text)
            }
            SessionState::Independent => (builder.independent)(&chunk.text),
            SessionState::Init | SessionState::Done => {
                return Err(ChunkwiseError::invalid_state(format!(
                    "no prompt for state {:?}",
                    next
                )))
            }
        };

        let index = self.history.len();
        let service = self.service.as_ref();
        info!(
            "[Turn {}/{}] model={} mode={:?} state={:?} prompt_tokens={}",
            index + 1,
            total,
            service.model(),
            mode,
            next,
            service.tokenize(&input)
        );
        debug!("user_input:\n\n{}", input);

        let prompt = input.as_str();
        let summary = self
            .pool
            .execute("complete", move |key| async move { service.complete(&key, prompt).await })
            .await?
            .trim()
            .to_string();
        debug!("summary:\n\n{}", summary);

        let mut turn = Turn {
            index,
            input,
            summary,
            embedding: Vec::new(),
            source_paragraph: Some(chunk.text.clone()),
        };

        let transcript = turn.transcript();
        let text = transcript.as_str();
        turn.embedding = self
            .pool
            .execute("embed", move |key| async move { service.embed(&key, text).await })
            .await?;

        info!("[Turn {}/{}] done, vectorization finished", index + 1, total);
        self.history.push(turn);
        self.state = next;
        Ok(())
    }
}
