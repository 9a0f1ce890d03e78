//! Deterministic embedders and fixtures shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use lodestar::chunking::{BpeTokenizer, ChunkingConfig, TextChunker};
use lodestar::config::Settings;
use lodestar::embedding::Embedder;
use lodestar::{LodestarError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const DIMENSIONS: usize = 64;

/// Bag-of-words embedder: every new word is given its own axis.
#[derive(Default)]
pub struct VocabularyEmbedder {
    vocabulary: Mutex<HashMap<String, usize>>,
}

impl VocabularyEmbedder {
    pub fn vector(&self, text: &str) -> Result<Vec<f32>> {
        let mut vocabulary = self.vocabulary.lock().unwrap();
        let mut vector = vec![0.0; DIMENSIONS];

        for word in text.split_whitespace() {
            let word: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if word.is_empty() {
                continue;
            }

            let next = vocabulary.len();
            let axis = *vocabulary.entry(word).or_insert(next);
            if axis >= DIMENSIONS {
                return Err(LodestarError::Embedding("vocabulary exhausted".to_string()));
            }
            vector[axis] += 1.0;
        }

        Ok(vector)
    }
}

#[async_trait]
impl Embedder for VocabularyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.vector(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.vector(t)).collect()
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

/// Embedder whose every call fails, as if the provider were down.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(LodestarError::Embedding("provider unavailable".to_string()))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(LodestarError::Embedding("provider unavailable".to_string()))
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

pub fn chunker(max_tokens: usize, overlap: usize) -> TextChunker {
    TextChunker::new(
        Arc::new(BpeTokenizer::cl100k().unwrap()),
        ChunkingConfig::new(max_tokens, overlap).unwrap(),
    )
    .unwrap()
}

/// Settings whose store files live under `dir`.
pub fn settings_in(dir: &Path) -> Settings {
    let mut settings = Settings::default().with_store_dir(dir);
    settings.embedding.dimensions = DIMENSIONS as u32;
    settings
}
