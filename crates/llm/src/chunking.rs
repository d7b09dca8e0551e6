use chunkwise_common::{storage, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::service::CompletionService;

/// Share of ASCII letters above which a text counts as Latin-script
pub const LATIN_RATIO_THRESHOLD: f64 = 0.6;

/// Sentence delimiter for Latin-script text
pub const LATIN_DELIMITER: &str = ". ";

/// Sentence delimiter for CJK-script text (full-width period)
pub const CJK_DELIMITER: &str = "。";

/// Separator line between chunks in the human-readable artifact
const ARTIFACT_SEPARATOR_WIDTH: usize = 30;

/// Dominant script of a text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    LatinScript,
    CjkScript,
    /// Nothing to classify (empty text)
    Unknown,
}

impl Language {
    /// Delimiter sentences are split on; unresolved text is treated as Latin
    pub fn sentence_delimiter(self) -> &'static str {
        match self {
            Self::CjkScript => CJK_DELIMITER,
            Self::LatinScript | Self::Unknown => LATIN_DELIMITER,
        }
    }
}

/// Classify text by the ratio of ASCII letters to all characters
pub fn detect_language(text: &str) -> Language {
    let total = text.chars().count();
    if total == 0 {
        return Language::Unknown;
    }

    let latin = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
    if latin as f64 / total as f64 > LATIN_RATIO_THRESHOLD {
        Language::LatinScript
    } else {
        Language::CjkScript
    }
}

/// Token-bounded, sentence-aligned slice of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the document's chunk sequence
    pub index: usize,

    /// Chunk text, including each sentence's delimiter
    pub text: String,

    /// Sum of the sentence token counts
    pub token_count: usize,

    /// Single sentence that alone exceeds the budget
    pub oversized: bool,
}

/// One speaker turn of a meeting transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    /// Speaker name
    pub speaker: String,

    /// What was said
    pub text: String,
}

impl Utterance {
    /// Render as `speaker: text`
    pub fn to_text(&self) -> String {
        format!("{}: {}", self.speaker, self.text)
    }
}

/// Block of sentences being accumulated
#[derive(Default)]
struct Block {
    text: String,
    tokens: usize,
    sentences: usize,
}

/// Greedy sentence packer bounded by a token budget
#[derive(Debug, Clone, Copy)]
pub struct TokenBudgetSplitter {
    max_tokens: usize,
}

impl TokenBudgetSplitter {
    /// Create a splitter with the given token budget per chunk
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// Token budget per chunk
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Split a document on the sentence delimiter of `language`
    ///
    /// Concatenating the returned chunk texts yields `text` unchanged.
    pub fn split<S>(&self, text: &str, language: Language, service: &S) -> Vec<Chunk>
    where
        S: CompletionService + ?Sized,
    {
        self.split_on(text, language.sentence_delimiter(), service)
    }

    /// Split a meeting transcript: utterances joined by blank lines, always
    /// split on the full-width period
    pub fn split_meeting<S>(&self, utterances: &[Utterance], service: &S) -> Vec<Chunk>
    where
        S: CompletionService + ?Sized,
    {
        let transcript = utterances
            .iter()
            .map(Utterance::to_text)
            .collect::<Vec<_>>()
            .join("\n\n");
        self.split_on(&transcript, CJK_DELIMITER, service)
    }

    fn split_on<S>(&self, text: &str, delimiter: &str, service: &S) -> Vec<Chunk>
    where
        S: CompletionService + ?Sized,
    {
        let mut chunks = Vec::new();
        let mut block = Block::default();

        for sentence in text.split_inclusive(delimiter) {
            let tokens = service.tokenize(sentence);
            if block.sentences > 0 && block.tokens + tokens > self.max_tokens {
                self.flush(&mut chunks, &mut block);
            }
            block.text.push_str(sentence);
            block.tokens += tokens;
            block.sentences += 1;
        }

        if block.sentences > 0 {
            self.flush(&mut chunks, &mut block);
        }

        info!(
            "Split {} chars into {} chunks (max_tokens={})",
            text.len(),
            chunks.len(),
            self.max_tokens
        );
        chunks
    }

    fn flush(&self, chunks: &mut Vec<Chunk>, block: &mut Block) {
        let block = std::mem::take(block);
        let oversized = block.tokens > self.max_tokens;
        if oversized {
            // Only reachable with a single sentence; it is emitted as is.
            warn!(
                "ChunkOverflowWarning: chunk {} is a single sentence of {} tokens (max_tokens={})",
                chunks.len(),
                block.tokens,
                self.max_tokens
            );
        }

        chunks.push(Chunk {
            index: chunks.len(),
            text: block.text,
            token_count: block.tokens,
            oversized,
        });
    }
}

/// Write the chunk sequence as `<name>.<model>.json` (array of strings) and
/// `<name>.<model>.txt` (chunks joined by a `#` separator line)
pub fn write_chunk_artifacts(
    dir: &Path,
    name: &str,
    model: &str,
    chunks: &[Chunk],
) -> Result<(PathBuf, PathBuf)> {
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();

    let json_path = dir.join(format!("{}.{}.json", name, model));
    storage::save_json_file(&json_path, &texts)?;

    let separator = format!("\n\n{}\n\n", "#".repeat(ARTIFACT_SEPARATOR_WIDTH));
    let txt_path = dir.join(format!("{}.{}.txt", name, model));
    storage::save_text_file(&txt_path, &texts.join(&separator))?;

    Ok((json_path, txt_path))
}
