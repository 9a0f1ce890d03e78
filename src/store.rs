//! The paired persistent store: a vector index plus its metadata.
//!
//! The two halves share one id space and are always mutated together.
//! Writes go index first, then metadata, so a crash between the two can only
//! leave index ids without records. Those are repaired on the next open.

use crate::config::Settings;
use crate::error::{LodestarError, Result};
use crate::metadata::{MetadataRecord, MetadataStore};
use crate::vector_store::{empty_index, open_index, IndexBackend, Neighbor, VectorIndex};
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// A chunk ready to be committed: its assigned id, vector and record.
#[derive(Debug, Clone)]
pub struct StagedChunk {
    pub vector: Vec<f32>,
    pub record: MetadataRecord,
}

/// Summary of the store contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: usize,
    pub sources: usize,
    pub backend: IndexBackend,
    pub dimension: usize,
}

/// Vector index and metadata store with a shared lifecycle.
pub struct KnowledgeStore {
    index: Box<dyn VectorIndex>,
    metadata: MetadataStore,
}

impl KnowledgeStore {
    /// Open the configured store, recovering from unreadable or diverged state.
    #[instrument(skip_all, fields(backend = %settings.vector_store.backend))]
    pub fn open(settings: &Settings) -> Result<Self> {
        let backend = settings.vector_store.backend;
        let in_memory = backend == IndexBackend::Memory;
        let metadata = if in_memory {
            Ok(MetadataStore::in_memory())
        } else {
            MetadataStore::load(&settings.metadata_path(), backend)
        };
        if let Err(LodestarError::BackendMismatch { expected, found }) = &metadata {
            return Err(LodestarError::BackendMismatch {
                expected: *expected,
                found: *found,
            });
        }
        let index = open_index(settings);

        let mut store = match (index, metadata) {
            (Ok(index), Ok(metadata)) => Self { index, metadata },
            (index, metadata) => {
                if let Err(e) = &index {
                    warn!("Vector index unreadable, starting empty: {}", e);
                }
                if let Err(e) = &metadata {
                    warn!("Metadata unreadable, starting empty: {}", e);
                }
                // Release any open database handle before recreating it.
                drop(index);

                let mut store = Self {
                    index: empty_index(settings)?,
                    metadata: if in_memory {
                        MetadataStore::in_memory()
                    } else {
                        MetadataStore::empty_at(&settings.metadata_path(), backend)
                    },
                };
                store.reset()?;
                store
            }
        };

        store.reconcile()?;
        info!("Opened store with {} entries", store.len()?);
        Ok(store)
    }

    /// Build a store from already-opened halves.
    pub fn from_parts(index: Box<dyn VectorIndex>, metadata: MetadataStore) -> Result<Self> {
        if let Some(found) = metadata.backend() {
            if found != index.backend() {
                return Err(LodestarError::BackendMismatch {
                    expected: index.backend(),
                    found,
                });
            }
        }

        let mut store = Self { index, metadata };
        store.reconcile()?;
        Ok(store)
    }

    /// A fresh in-memory store, useful for tests and one-off sessions.
    pub fn in_memory(dimension: usize) -> Self {
        Self {
            index: Box::new(crate::vector_store::MemoryIndex::new(dimension)),
            metadata: MetadataStore::in_memory(),
        }
    }

    /// Bring the two halves back to a shared, contiguous id space.
    fn reconcile(&mut self) -> Result<()> {
        let index_ids: HashSet<u64> = self.index.ids()?.into_iter().collect();
        let metadata_ids: HashSet<u64> = self.metadata.ids().into_iter().collect();

        let orphan_vectors: Vec<u64> = index_ids.difference(&metadata_ids).copied().collect();
        let orphan_records: Vec<u64> = metadata_ids.difference(&index_ids).copied().collect();

        if orphan_vectors.is_empty() && orphan_records.is_empty() && self.ids_contiguous() {
            return Ok(());
        }

        if !orphan_vectors.is_empty() {
            warn!("Dropping {} index entries with no metadata", orphan_vectors.len());
            self.index.remove(&orphan_vectors)?;
        }
        if !orphan_records.is_empty() {
            warn!("Dropping {} metadata records with no vector", orphan_records.len());
            self.metadata.remove(&orphan_records);
        }

        if !self.ids_contiguous() {
            warn!("Stored ids are not contiguous, resetting store");
            return self.reset();
        }

        self.persist()
    }

    fn ids_contiguous(&self) -> bool {
        self.metadata
            .ids()
            .iter()
            .enumerate()
            .all(|(expected, &id)| id == expected as u64)
    }

    /// Number of stored chunks.
    pub fn len(&self) -> Result<usize> {
        self.index.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.index.is_empty()
    }

    /// Id the next committed chunk will receive.
    pub fn next_id(&self) -> u64 {
        self.metadata.len() as u64
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn record(&self, id: u64) -> Option<&MetadataRecord> {
        self.metadata.get(id)
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.index.search(query, k)
    }

    /// Add a batch to both halves and persist, or leave the store untouched.
    #[instrument(skip_all, fields(count = batch.len()))]
    pub fn commit(&mut self, batch: Vec<StagedChunk>) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let first = self.next_id();
        for (offset, staged) in batch.iter().enumerate() {
            let expected = first + offset as u64;
            if staged.record.id != expected {
                return Err(LodestarError::VectorStore(format!(
                    "Staged id {} does not match next id {}",
                    staged.record.id, expected
                )));
            }
        }

        let ids: Vec<u64> = batch.iter().map(|s| s.record.id).collect();
        let (vectors, records): (Vec<Vec<f32>>, Vec<MetadataRecord>) =
            batch.into_iter().map(|s| (s.vector, s.record)).unzip();

        self.index.add(&vectors, &ids)?;
        if let Err(e) = self.metadata.put_all(records) {
            self.index.remove(&ids)?;
            return Err(e);
        }

        if let Err(e) = self.persist() {
            warn!("Persist failed, rolling back {} chunks: {}", ids.len(), e);
            self.index.remove(&ids)?;
            self.metadata.remove(&ids);
            return Err(e);
        }

        info!("Committed ids {}..{}", first, first + ids.len() as u64);
        Ok(ids.len())
    }

    /// Clear both halves and write the empty state.
    #[instrument(skip(self))]
    pub fn reset(&mut self) -> Result<()> {
        self.index.reset()?;
        self.metadata.reset();
        self.persist()?;
        info!("Store has been reset");
        Ok(())
    }

    /// Write the index, then the metadata.
    fn persist(&self) -> Result<()> {
        self.index.persist()?;
        self.metadata.persist()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let sources: HashSet<&str> = self
            .metadata
            .records()
            .map(|r| r.source_url.as_str())
            .collect();

        Ok(StoreStats {
            entries: self.len()?,
            sources: sources.len(),
            backend: self.index.backend(),
            dimension: self.dimension(),
        })
    }

    /// Add a vector to the index without a metadata record.
    #[cfg(test)]
    pub(crate) fn insert_index_only(&mut self, vector: Vec<f32>, id: u64) -> Result<()> {
        self.index.add(&[vector], &[id])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::test_support::FlakyIndex;
    use crate::vector_store::IdMapIndex;
    use chrono::Utc;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn staged(id: u64, url: &str, vector: Vec<f32>) -> StagedChunk {
        StagedChunk {
            vector,
            record: MetadataRecord {
                id,
                source_url: url.to_string(),
                title: String::new(),
                content_chunk: format!("chunk {}", id),
                chunk_index: 0,
                indexed_at: Utc::now(),
            },
        }
    }

    fn settings_in(dir: &std::path::Path, dimension: u32) -> Settings {
        let mut settings = Settings::default().with_store_dir(dir);
        settings.embedding.dimensions = dimension;
        settings
    }

    #[test]
    fn test_commit_assigns_contiguous_ids() {
        let mut store = KnowledgeStore::in_memory(2);
        assert_eq!(store.next_id(), 0);

        store
            .commit(vec![staged(0, "a", vec![1.0, 0.0]), staged(1, "a", vec![0.0, 1.0])])
            .unwrap();
        assert_eq!(store.next_id(), 2);

        let err = store.commit(vec![staged(5, "b", vec![1.0, 1.0])]).unwrap_err();
        assert!(matches!(err, LodestarError::VectorStore(_)));
        assert_eq!(store.len().unwrap(), 2);

        let stats = store.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.sources, 1);
        assert_eq!(stats.backend, IndexBackend::Memory);
    }

    #[test]
    fn test_failed_index_add_commits_nothing() {
        let mut store = KnowledgeStore::in_memory(2);
        let err = store
            .commit(vec![staged(0, "a", vec![1.0, 0.0]), staged(1, "a", vec![0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, LodestarError::InvalidInput(_)));
        assert!(store.is_empty().unwrap());
        assert_eq!(store.next_id(), 0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path(), 2);

        let mut store = KnowledgeStore::open(&settings).unwrap();
        store.commit(vec![staged(0, "a", vec![1.0, 0.0])]).unwrap();

        store.reset().unwrap();
        store.reset().unwrap();
        assert!(store.is_empty().unwrap());
        assert_eq!(store.next_id(), 0);
        assert!(store.search(&[1.0, 0.0], 3).unwrap().is_empty());

        let reopened = KnowledgeStore::open(&settings).unwrap();
        assert!(reopened.is_empty().unwrap());
    }

    #[test]
    fn test_reopen_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path(), 3);

        let mut store = KnowledgeStore::open(&settings).unwrap();
        store
            .commit(vec![
                staged(0, "a.com", vec![1.0, 0.2, 0.0]),
                staged(1, "b.com", vec![0.0, 1.0, 0.4]),
                staged(2, "b.com", vec![0.3, 0.3, 1.0]),
            ])
            .unwrap();

        let reopened = KnowledgeStore::open(&settings).unwrap();
        assert_eq!(reopened.len().unwrap(), 3);
        assert_eq!(reopened.next_id(), 3);
        assert_eq!(reopened.record(1).unwrap().source_url, "b.com");

        for query in [[1.0, 0.0, 0.0], [0.1, 0.9, 0.5], [-0.4, 0.2, 0.8]] {
            assert_eq!(store.search(&query, 3).unwrap(), reopened.search(&query, 3).unwrap());
        }
    }

    #[test]
    fn test_orphan_index_tail_is_reconciled_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path(), 2);

        let mut store = KnowledgeStore::open(&settings).unwrap();
        store.commit(vec![staged(0, "a", vec![1.0, 0.0])]).unwrap();

        // Simulate a crash after the index write but before the metadata write.
        let mut index = IdMapIndex::load(&settings.index_path(), 2).unwrap();
        index.add(&[vec![0.0, 1.0]], &[1]).unwrap();
        index.persist().unwrap();

        let reopened = KnowledgeStore::open(&settings).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
        assert_eq!(reopened.next_id(), 1);
        assert_eq!(IdMapIndex::load(&settings.index_path(), 2).unwrap().ids().unwrap(), vec![0]);
    }

    #[test]
    fn test_corrupt_metadata_resets_both_halves() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path(), 2);

        let mut store = KnowledgeStore::open(&settings).unwrap();
        store
            .commit(vec![staged(0, "a", vec![1.0, 0.0]), staged(1, "b", vec![0.0, 1.0])])
            .unwrap();

        std::fs::write(settings.metadata_path(), b"garbage").unwrap();

        let reopened = KnowledgeStore::open(&settings).unwrap();
        assert!(reopened.is_empty().unwrap());
        assert_eq!(reopened.next_id(), 0);
        assert!(IdMapIndex::load(&settings.index_path(), 2).unwrap().is_empty().unwrap());
    }

    #[test]
    fn test_corrupt_index_resets_both_halves() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path(), 2);

        let mut store = KnowledgeStore::open(&settings).unwrap();
        store.commit(vec![staged(0, "a", vec![1.0, 0.0])]).unwrap();

        std::fs::write(settings.index_path(), b"garbage").unwrap();

        let reopened = KnowledgeStore::open(&settings).unwrap();
        assert!(reopened.is_empty().unwrap());
        assert!(MetadataStore::load(&settings.metadata_path(), IndexBackend::IdMap)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_sqlite_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(dir.path(), 2);
        settings.vector_store.backend = IndexBackend::Sqlite;

        let mut store = KnowledgeStore::open(&settings).unwrap();
        store
            .commit(vec![staged(0, "a", vec![1.0, 0.0]), staged(1, "b", vec![0.0, 1.0])])
            .unwrap();
        drop(store);

        let reopened = KnowledgeStore::open(&settings).unwrap();
        assert_eq!(reopened.len().unwrap(), 2);
        assert_eq!(reopened.stats().unwrap().backend, IndexBackend::Sqlite);
        assert_eq!(reopened.search(&[0.0, 1.0], 1).unwrap()[0].id, 1);
    }

    #[test]
    fn test_switching_backends_keeps_each_store() {
        let dir = tempfile::tempdir().unwrap();
        let idmap = settings_in(dir.path(), 2);
        let mut sqlite = idmap.clone();
        sqlite.vector_store.backend = IndexBackend::Sqlite;

        let mut store = KnowledgeStore::open(&idmap).unwrap();
        store
            .commit(vec![staged(0, "a", vec![1.0, 0.0]), staged(1, "b", vec![0.0, 1.0])])
            .unwrap();
        drop(store);

        let mut other = KnowledgeStore::open(&sqlite).unwrap();
        assert!(other.is_empty().unwrap());
        other.commit(vec![staged(0, "c", vec![1.0, 1.0])]).unwrap();
        drop(other);

        let back = KnowledgeStore::open(&idmap).unwrap();
        assert_eq!(back.len().unwrap(), 2);
        assert_eq!(back.record(1).unwrap().source_url, "b");

        let other = KnowledgeStore::open(&sqlite).unwrap();
        assert_eq!(other.len().unwrap(), 1);
        assert_eq!(other.record(0).unwrap().source_url, "c");
    }

    #[test]
    fn test_mismatched_metadata_is_refused_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let idmap = settings_in(dir.path(), 2);
        let mut sqlite = idmap.clone();
        sqlite.vector_store.backend = IndexBackend::Sqlite;

        let mut store = KnowledgeStore::open(&idmap).unwrap();
        store.commit(vec![staged(0, "a", vec![1.0, 0.0])]).unwrap();
        drop(store);

        std::fs::copy(idmap.metadata_path(), sqlite.metadata_path()).unwrap();
        let before = std::fs::read(sqlite.metadata_path()).unwrap();

        assert!(matches!(
            KnowledgeStore::open(&sqlite),
            Err(LodestarError::BackendMismatch {
                expected: IndexBackend::Sqlite,
                found: IndexBackend::IdMap,
            })
        ));
        assert_eq!(std::fs::read(sqlite.metadata_path()).unwrap(), before);
        assert!(!sqlite.sqlite_path().exists());

        let metadata = MetadataStore::load(&idmap.metadata_path(), IndexBackend::IdMap).unwrap();
        let index = Box::new(crate::vector_store::MemoryIndex::new(2));
        assert!(matches!(
            KnowledgeStore::from_parts(index, metadata),
            Err(LodestarError::BackendMismatch { .. })
        ));
    }

    #[test]
    fn test_unreadable_index_is_an_error_not_an_empty_store() {
        let broken = Arc::new(AtomicBool::new(true));
        let mut metadata = MetadataStore::in_memory();
        metadata
            .put(staged(0, "a", vec![1.0, 0.0]).record)
            .unwrap();

        let index = Box::new(FlakyIndex::new(2, broken));
        assert!(matches!(
            KnowledgeStore::from_parts(index, metadata),
            Err(LodestarError::Database(_))
        ));
    }
}
