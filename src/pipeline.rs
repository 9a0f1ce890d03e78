//! The retrieval pipeline: chunk, embed, store, and query.
//!
//! Ingestion is all-or-nothing per document and best effort across
//! documents. Successful documents are committed to the store in one batch,
//! so their ids are contiguous and follow input order.

use crate::chunking::{ChunkingConfig, TextChunker};
use crate::config::Settings;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{LodestarError, Result};
use crate::metadata::MetadataRecord;
use crate::rag::{ContextBlock, Retrieval};
use crate::sources::SourceDocument;
use crate::store::{KnowledgeStore, StagedChunk, StoreStats};
use crate::vector_store::normalize;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A document that could not be ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFailure {
    pub source_url: String,
    pub error: String,
}

/// Outcome of an ingest call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    /// Documents with no content.
    pub skipped: usize,
    pub failures: Vec<IngestFailure>,
}

/// Chunked and embedded text for one document.
type EmbeddedChunks = Vec<(String, Vec<f32>)>;

/// Chunks documents, embeds them, and answers similarity queries.
pub struct RetrievalPipeline {
    embedder: Arc<dyn Embedder>,
    chunker: TextChunker,
    store: KnowledgeStore,
    max_concurrent: usize,
}

impl RetrievalPipeline {
    /// Build the pipeline described by `settings`, opening the persisted store.
    pub fn new(settings: &Settings) -> Result<Self> {
        let embedder = Arc::new(OpenAIEmbedder::with_config(
            &settings.embedding.model,
            settings.embedding.dimensions as usize,
        )?);
        let chunker = TextChunker::for_model(
            &settings.chunking.encoding_model,
            ChunkingConfig::new(settings.chunking.max_tokens, settings.chunking.overlap)?,
        )?;
        let store = KnowledgeStore::open(settings)?;

        Ok(Self::with_components(embedder, chunker, store)?
            .with_concurrency(settings.embedding.max_concurrent))
    }

    /// Assemble a pipeline from its parts. The embedder and the store must
    /// agree on the vector dimension.
    pub fn with_components(
        embedder: Arc<dyn Embedder>,
        chunker: TextChunker,
        store: KnowledgeStore,
    ) -> Result<Self> {
        if embedder.dimensions() != store.dimension() {
            return Err(LodestarError::DimensionMismatch {
                expected: store.dimension(),
                actual: embedder.dimensions(),
            });
        }

        Ok(Self {
            embedder,
            chunker,
            store,
            max_concurrent: 4,
        })
    }

    /// Limit how many documents are embedded at once.
    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn len(&self) -> Result<usize> {
        self.store.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.store.is_empty()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }

    /// Chunk, embed and store `documents`.
    ///
    /// A document whose chunking or embedding fails contributes nothing and
    /// is listed in the report. A failed commit fails the whole call.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn ingest(&mut self, documents: &[SourceDocument]) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        if documents.is_empty() {
            return Ok(report);
        }

        let dimension = self.store.dimension();
        let chunker = &self.chunker;
        let embedder = &self.embedder;

        // Embed in parallel, then restore input order so ids follow it
        let mut results: Vec<(usize, Result<EmbeddedChunks>)> =
            stream::iter(documents.iter().enumerate())
                .map(|(idx, doc)| async move {
                    (idx, embed_document(chunker, embedder.as_ref(), dimension, doc).await)
                })
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;
        results.sort_by_key(|(idx, _)| *idx);

        let mut next_id = self.store.next_id();
        let indexed_at = Utc::now();
        let mut batch = Vec::new();

        for (idx, result) in results {
            let doc = &documents[idx];
            match result {
                Ok(chunks) if chunks.is_empty() => {
                    debug!("Skipping {}: no content", doc.source_url);
                    report.skipped += 1;
                }
                Ok(chunks) => {
                    report.documents_indexed += 1;
                    report.chunks_indexed += chunks.len();
                    for (chunk_index, (text, vector)) in chunks.into_iter().enumerate() {
                        batch.push(StagedChunk {
                            vector,
                            record: MetadataRecord {
                                id: next_id,
                                source_url: doc.source_url.clone(),
                                title: doc.title.clone(),
                                content_chunk: text,
                                chunk_index: chunk_index as u32,
                                indexed_at,
                            },
                        });
                        next_id += 1;
                    }
                }
                Err(e) => {
                    warn!("Failed to ingest {}: {}", doc.source_url, e);
                    report.failures.push(IngestFailure {
                        source_url: doc.source_url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.store.commit(batch)?;

        info!(
            "Indexed {} chunks from {} documents ({} skipped, {} failed)",
            report.chunks_indexed,
            report.documents_indexed,
            report.skipped,
            report.failures.len()
        );
        Ok(report)
    }

    /// Find the `k` chunks most similar to `question`.
    #[instrument(skip(self), fields(question = %question))]
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Retrieval> {
        if self.store.is_empty()? {
            debug!("Store is empty");
            return Ok(Retrieval::NoData);
        }

        let query = self.embedder.embed(question).await?;
        let neighbors = self.store.search(&query, k)?;

        let blocks = neighbors
            .into_iter()
            .filter_map(|neighbor| match self.store.record(neighbor.id) {
                Some(record) => Some(ContextBlock {
                    id: neighbor.id,
                    score: neighbor.score,
                    source_url: record.source_url.clone(),
                    title: record.title.clone(),
                    content: record.content_chunk.clone(),
                    chunk_index: record.chunk_index,
                }),
                None => {
                    debug!("No metadata for id {}, skipping", neighbor.id);
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!("Retrieved {} blocks", blocks.len());
        Ok(Retrieval::Hits(blocks))
    }

    /// Remove everything from the store.
    pub fn reset(&mut self) -> Result<()> {
        self.store.reset()
    }
}

async fn embed_document(
    chunker: &TextChunker,
    embedder: &dyn Embedder,
    dimension: usize,
    doc: &SourceDocument,
) -> Result<EmbeddedChunks> {
    let chunks = chunker.chunk(&doc.content)?;
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let vectors = embedder.embed_batch(&chunks).await?;
    if vectors.len() != chunks.len() {
        return Err(LodestarError::Embedding(format!(
            "Expected {} embeddings, got {}",
            chunks.len(),
            vectors.len()
        )));
    }
    for vector in &vectors {
        if vector.len() != dimension {
            return Err(LodestarError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        if normalize(vector).is_none() {
            return Err(LodestarError::Embedding(
                "Provider returned a zero or non-finite vector".to_string(),
            ));
        }
    }

    Ok(chunks.into_iter().zip(vectors).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::BpeTokenizer;
    use async_trait::async_trait;
    use crate::vector_store::test_support::FlakyIndex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const KEYWORDS: [&str; 3] = ["gold", "armor", "horse"];

    /// Counts keywords, plus a constant axis so no vector is zero.
    #[derive(Default)]
    struct KeywordEmbedder {
        calls: AtomicUsize,
        short_batches: bool,
    }

    impl KeywordEmbedder {
        fn vector(text: &str) -> Vec<f32> {
            let text = text.to_lowercase();
            let mut v: Vec<f32> = KEYWORDS
                .iter()
                .map(|k| text.matches(k).count() as f32)
                .collect();
            v.push(0.1);
            v
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::vector(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(LodestarError::Embedding("provider rejected input".to_string()));
            }
            let mut vectors: Vec<_> = texts.iter().map(|t| Self::vector(t)).collect();
            if self.short_batches {
                vectors.pop();
            }
            Ok(vectors)
        }

        fn dimensions(&self) -> usize {
            KEYWORDS.len() + 1
        }
    }

    fn pipeline(embedder: Arc<KeywordEmbedder>) -> RetrievalPipeline {
        let chunker = TextChunker::new(
            Arc::new(BpeTokenizer::cl100k().unwrap()),
            ChunkingConfig::default(),
        )
        .unwrap();
        let store = KnowledgeStore::in_memory(KEYWORDS.len() + 1);
        RetrievalPipeline::with_components(embedder, chunker, store).unwrap()
    }

    fn doc(url: &str, content: &str) -> SourceDocument {
        SourceDocument::new(url, "", content)
    }

    #[tokio::test]
    async fn test_empty_store_returns_no_data_without_embedding() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let pipeline = pipeline(embedder.clone());

        let retrieval = pipeline.retrieve("where is the gold?", 2).await.unwrap();
        assert_eq!(retrieval, Retrieval::NoData);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_document_is_isolated() {
        let mut pipeline = pipeline(Arc::new(KeywordEmbedder::default()));

        let report = pipeline
            .ingest(&[
                doc("a.com", "gold bar locations are in chapter 2"),
                doc("bad.com", "poison pill"),
                doc("empty.com", "   "),
                doc("b.com", "to get armor, visit the blacksmith"),
            ])
            .await
            .unwrap();

        assert_eq!(report.documents_indexed, 2);
        assert_eq!(report.chunks_indexed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source_url, "bad.com");
        assert!(report.failures[0].error.contains("provider rejected input"));

        assert_eq!(pipeline.len().unwrap(), 2);
        assert_eq!(pipeline.store().record(0).unwrap().source_url, "a.com");
        assert_eq!(pipeline.store().record(1).unwrap().source_url, "b.com");
    }

    #[tokio::test]
    async fn test_short_embedding_batch_fails_document() {
        let embedder = Arc::new(KeywordEmbedder {
            short_batches: true,
            ..Default::default()
        });
        let mut pipeline = pipeline(embedder);

        let report = pipeline.ingest(&[doc("a.com", "gold")]).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(pipeline.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_index_only_id_is_skipped() {
        let mut pipeline = pipeline(Arc::new(KeywordEmbedder::default()));
        pipeline
            .ingest(&[doc("a.com", "the horse is in the stable")])
            .await
            .unwrap();

        pipeline
            .store
            .insert_index_only(KeywordEmbedder::vector("gold gold"), 1)
            .unwrap();

        let retrieval = pipeline.retrieve("gold", 5).await.unwrap();
        let blocks = retrieval.blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, 0);
        assert_eq!(blocks[0].source_url, "a.com");
    }

    #[tokio::test]
    async fn test_reset_then_no_data() {
        let mut pipeline = pipeline(Arc::new(KeywordEmbedder::default()));
        pipeline.ingest(&[doc("a.com", "gold")]).await.unwrap();
        assert!(!pipeline.retrieve("gold", 1).await.unwrap().is_no_data());

        pipeline.reset().unwrap();
        assert!(pipeline.is_empty().unwrap());
        assert!(pipeline.retrieve("gold", 1).await.unwrap().is_no_data());

        pipeline.ingest(&[doc("b.com", "armor")]).await.unwrap();
        assert_eq!(pipeline.store().record(0).unwrap().source_url, "b.com");
    }

    #[test]
    fn test_dimension_must_match() {
        let chunker = TextChunker::new(
            Arc::new(BpeTokenizer::cl100k().unwrap()),
            ChunkingConfig::default(),
        )
        .unwrap();
        let result = RetrievalPipeline::with_components(
            Arc::new(KeywordEmbedder::default()),
            chunker,
            KnowledgeStore::in_memory(8),
        );
        assert!(matches!(
            result,
            Err(LodestarError::DimensionMismatch { expected: 8, actual: 4 })
        ));
    }

    #[tokio::test]
    async fn test_unreadable_index_is_not_reported_as_no_data() {
        let broken = Arc::new(AtomicBool::new(false));
        let store = KnowledgeStore::from_parts(
            Box::new(FlakyIndex::new(KEYWORDS.len() + 1, broken.clone())),
            crate::metadata::MetadataStore::in_memory(),
        )
        .unwrap();
        let chunker = TextChunker::new(
            Arc::new(BpeTokenizer::cl100k().unwrap()),
            ChunkingConfig::default(),
        )
        .unwrap();
        let embedder = Arc::new(KeywordEmbedder::default());
        let mut pipeline =
            RetrievalPipeline::with_components(embedder.clone(), chunker, store).unwrap();
        pipeline.ingest(&[doc("a.com", "gold")]).await.unwrap();

        broken.store(true, Ordering::SeqCst);
        assert!(matches!(
            pipeline.retrieve("gold", 1).await,
            Err(LodestarError::Database(_))
        ));
        assert!(pipeline.is_empty().is_err());
    }
}
