use chunkwise_common::{ChunkwiseError, Result};
use std::fmt;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// BPE token counter matching a model's tokenizer
#[derive(Clone)]
pub struct Tokenizer {
    bpe: Arc<CoreBPE>,
    model: String,
}

impl Tokenizer {
    /// Tokenizer for `model`, falling back to cl100k_base for models
    /// tiktoken does not know
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(e) => {
                warn!("No tokenizer for model {} ({}), using cl100k_base", model, e);
                tiktoken_rs::cl100k_base().map_err(|e| {
                    ChunkwiseError::config(format!("Failed to load cl100k_base: {}", e))
                })?
            }
        };

        Ok(Self {
            bpe: Arc::new(bpe),
            model: model.to_string(),
        })
    }

    /// Count tokens in text
    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer").field("model", &self.model).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_models() {
        for model in ["gpt-3.5-turbo", "text-davinci-003"] {
            let tokenizer = Tokenizer::for_model(model).unwrap();
            let count = tokenizer.count_tokens("Hello, world! This is a test.");
            assert!(count > 0 && count < 20, "{}: {}", model, count);
        }
    }

    #[test]
    fn test_unknown_model_falls_back() {
        let tokenizer = Tokenizer::for_model("some-local-model").unwrap();
        assert_eq!(tokenizer.count_tokens(""), 0);
        assert!(tokenizer.count_tokens("hello") > 0);
    }
}
