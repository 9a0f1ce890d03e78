//! BPE tokenizer backed by `tiktoken-rs`.

use super::Tokenizer;
use crate::error::{LodestarError, Result};
use tiktoken_rs::CoreBPE;
use tracing::debug;

/// Tokenizer matching the token accounting of an OpenAI model.
pub struct BpeTokenizer {
    bpe: CoreBPE,
}

impl BpeTokenizer {
    /// Create a tokenizer for the given model.
    /// Falls back to cl100k_base if the model isn't recognized.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .or_else(|_| {
                debug!("No tokenizer registered for {}, using cl100k_base", model);
                tiktoken_rs::cl100k_base()
            })
            .map_err(|e| LodestarError::Chunking(format!("Failed to load tokenizer: {}", e)))?;
        Ok(Self { bpe })
    }

    /// The encoding used by `text-embedding-3-small` and `text-embedding-3-large`.
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| LodestarError::Chunking(format!("Failed to load tokenizer: {}", e)))?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for BpeTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    fn token_lengths(&self, tokens: &[u32]) -> Vec<usize> {
        self.bpe
            ._decode_native_and_split(tokens.to_vec())
            .map(|bytes| bytes.len())
            .collect()
    }
}
