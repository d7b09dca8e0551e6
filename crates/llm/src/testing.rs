//! Deterministic in-memory completion service for unit tests.

use async_trait::async_trait;
use chunkwise_common::{ChunkwiseError, Result, ServiceErrorKind};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::service::CompletionService;

/// Scripted behaviour of one upcoming `complete` call
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Succeed,
    Fail(ServiceErrorKind),
    Hang(Duration),
}

/// Recorded `complete` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub credential: String,
    pub prompt: String,
}

/// Word-count tokenizer; completions echo the prompt length
#[derive(Default)]
pub struct StubService {
    script: Mutex<VecDeque<Step>>,
    failing_credentials: Mutex<HashMap<String, ServiceErrorKind>>,
    calls: Mutex<Vec<Call>>,
    embeds: Mutex<Vec<String>>,
}

impl StubService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue behaviour for the next `complete` calls, in order
    pub fn script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script.lock().unwrap().extend(steps);
        self
    }

    /// Every call made with `credential` fails with `kind`
    pub fn fail_credential(self, credential: &str, kind: ServiceErrorKind) -> Self {
        self.failing_credentials
            .lock()
            .unwrap()
            .insert(credential.to_string(), kind);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn embeds(&self) -> Vec<String> {
        self.embeds.lock().unwrap().clone()
    }

    /// Deterministic completion for a prompt
    pub fn summary_for(prompt: &str) -> String {
        format!("summary of {} words", prompt.split_whitespace().count())
    }
}

#[async_trait]
impl CompletionService for StubService {
    fn model(&self) -> &str {
        "stub-model"
    }

    fn tokenize(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    async fn complete(&self, credential: &str, prompt: &str) -> Result<String> {
        self.calls.lock().unwrap().push(Call {
            credential: credential.to_string(),
            prompt: prompt.to_string(),
        });

        if let Some(kind) = self.failing_credentials.lock().unwrap().get(credential) {
            return Err(ChunkwiseError::service(*kind, format!("{} rejected", credential)));
        }

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Fail(kind)) => Err(ChunkwiseError::service(kind, "scripted failure")),
            Some(Step::Hang(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(format!("  {}  ", Self::summary_for(prompt)))
            }
            Some(Step::Succeed) | None => Ok(format!("  {}\n", Self::summary_for(prompt))),
        }
    }

    async fn embed(&self, credential: &str, text: &str) -> Result<Vec<f32>> {
        if let Some(kind) = self.failing_credentials.lock().unwrap().get(credential) {
            return Err(ChunkwiseError::service(*kind, format!("{} rejected", credential)));
        }
        self.embeds.lock().unwrap().push(text.to_string());
        Ok(vec![text.len() as f32, 1.0])
    }
}
