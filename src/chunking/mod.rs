//! Token-window chunking for scraped documents.
//!
//! Documents are split into windows of at most `max_tokens` tokens, where
//! consecutive windows share `overlap` tokens. Token accounting uses the same
//! BPE encoding as the embedding model so chunks respect its input limit.

mod tokenizer;

pub use tokenizer::BpeTokenizer;

use crate::error::{LodestarError, Result};
use std::ops::Range;
use std::sync::Arc;

/// Converts text to and from token ids.
pub trait Tokenizer: Send + Sync {
    /// Encode text into token ids.
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Byte length of each token's text. A token may hold part of a
    /// multi-byte character.
    fn token_lengths(&self, tokens: &[u32]) -> Vec<usize>;
}

/// Window sizing for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum tokens per chunk.
    pub max_tokens: usize,
    /// Tokens shared between consecutive chunks.
    pub overlap: usize,
}

impl ChunkingConfig {
    /// Create a validated config.
    pub fn new(max_tokens: usize, overlap: usize) -> Result<Self> {
        let config = Self { max_tokens, overlap };
        config.validate()?;
        Ok(config)
    }

    /// Reject configs that would never advance through the text.
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(LodestarError::Chunking(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.max_tokens {
            return Err(LodestarError::Chunking(format!(
                "overlap ({}) must be smaller than max_tokens ({})",
                self.overlap, self.max_tokens
            )));
        }
        Ok(())
    }

    /// Distance between the starts of consecutive windows.
    pub fn stride(&self) -> usize {
        self.max_tokens - self.overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            overlap: 100,
        }
    }
}

/// Splits text into overlapping token windows.
#[derive(Clone)]
pub struct TextChunker {
    tokenizer: Arc<dyn Tokenizer>,
    config: ChunkingConfig,
}

impl TextChunker {
    /// Create a chunker with the given tokenizer.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { tokenizer, config })
    }

    /// Create a chunker using the BPE encoding of `model`.
    pub fn for_model(model: &str, config: ChunkingConfig) -> Result<Self> {
        Self::new(Arc::new(BpeTokenizer::for_model(model)?), config)
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Token ranges covering a sequence of `token_count` tokens.
    pub fn windows(&self, token_count: usize) -> Vec<Range<usize>> {
        self.aligned_windows(token_count, |_| true)
    }

    /// Like [`windows`](Self::windows), but window edges move back to the
    /// nearest position where `is_boundary` holds. Windows never grow past
    /// `max_tokens` and never leave a gap.
    fn aligned_windows(
        &self,
        token_count: usize,
        is_boundary: impl Fn(usize) -> bool,
    ) -> Vec<Range<usize>> {
        let max = self.config.max_tokens;
        let overlap = self.config.overlap;

        let mut windows = Vec::new();
        let mut start = 0;
        while start < token_count {
            let mut end = (start + max).min(token_count);
            while end < token_count && end > start + 1 && !is_boundary(end) {
                end -= 1;
            }
            windows.push(start..end);
            if end == token_count {
                break;
            }

            let mut next = end.saturating_sub(overlap).max(start + 1);
            while next > start + 1 && !is_boundary(next) {
                next -= 1;
            }
            start = next;
        }
        windows
    }

    /// Split `text` into chunks.
    ///
    /// Text that already fits in one window comes back unchanged. Blank text
    /// yields no chunks. Windows are cut where a character starts, so with no
    /// overlap the chunks concatenate back to `text`.
    pub fn chunk(&self, text: &str) -> Result<Vec<String>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let tokens = self.tokenizer.encode(text);
        if tokens.len() <= self.config.max_tokens {
            return Ok(vec![text.to_string()]);
        }

        let mut offsets = Vec::with_capacity(tokens.len() + 1);
        offsets.push(0);
        for len in self.tokenizer.token_lengths(&tokens) {
            offsets.push(offsets[offsets.len() - 1] + len);
        }
        if offsets.len() != tokens.len() + 1 || offsets[tokens.len()] != text.len() {
            return Err(LodestarError::Chunking(
                "Token lengths do not add up to the input text".to_string(),
            ));
        }

        let bytes = text.as_bytes();
        Ok(self
            .aligned_windows(tokens.len(), |i| text.is_char_boundary(offsets[i]))
            .into_iter()
            .map(|range| {
                String::from_utf8_lossy(&bytes[offsets[range.start]..offsets[range.end]])
                    .into_owned()
            })
            .collect())
    }
}
