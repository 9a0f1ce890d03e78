//! Metadata records keyed by the same ids as the vector index.

use crate::error::{LodestarError, Result};
use crate::vector_store::IndexBackend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Source information for one indexed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: u64,
    pub source_url: String,
    pub title: String,
    pub content_chunk: String,
    /// Position of this chunk within its source document.
    pub chunk_index: u32,
    pub indexed_at: DateTime<Utc>,
}

/// On-disk layout: the owning backend, then the records in id order.
#[derive(Serialize, Deserialize)]
struct MetadataFile<R> {
    backend: IndexBackend,
    records: Vec<R>,
}

/// Ordered id → record map with optional file persistence.
///
/// A persisted store is tagged with the index backend it pairs with, and
/// refuses to load a file written for a different one.
#[derive(Debug, Default)]
pub struct MetadataStore {
    path: Option<PathBuf>,
    backend: Option<IndexBackend>,
    records: BTreeMap<u64, MetadataRecord>,
}

impl MetadataStore {
    /// Create a store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the records `backend` wrote to `path`. A missing file yields an
    /// empty store.
    #[instrument(skip_all, fields(path = %path.display(), backend = %backend))]
    pub fn load(path: &Path, backend: IndexBackend) -> Result<Self> {
        let mut store = Self::empty_at(path, backend);

        if !path.exists() {
            debug!("No metadata file, starting empty");
            return Ok(store);
        }

        let bytes = std::fs::read(path)?;
        let file: MetadataFile<MetadataRecord> = bincode::deserialize(&bytes).map_err(|e| {
            LodestarError::Metadata(format!("Unreadable metadata file {}: {}", path.display(), e))
        })?;
        if file.backend != backend {
            return Err(LodestarError::BackendMismatch {
                expected: backend,
                found: file.backend,
            });
        }

        for record in file.records {
            let id = record.id;
            if store.records.insert(id, record).is_some() {
                return Err(LodestarError::DuplicateId(id));
            }
        }

        info!("Loaded {} metadata records", store.records.len());
        Ok(store)
    }

    /// Create an empty store persisted to `path`, ignoring any existing file.
    pub fn empty_at(path: &Path, backend: IndexBackend) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            backend: Some(backend),
            records: BTreeMap::new(),
        }
    }

    /// The backend this store pairs with. `None` for in-memory stores.
    pub fn backend(&self) -> Option<IndexBackend> {
        self.backend
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&MetadataRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.records.contains_key(&id)
    }

    /// All ids in ascending order.
    pub fn ids(&self) -> Vec<u64> {
        self.records.keys().copied().collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &MetadataRecord> {
        self.records.values()
    }

    /// Insert a record. The id must not already exist.
    pub fn put(&mut self, record: MetadataRecord) -> Result<()> {
        if self.records.contains_key(&record.id) {
            return Err(LodestarError::DuplicateId(record.id));
        }
        self.records.insert(record.id, record);
        Ok(())
    }

    /// Insert a batch of records, or none of them if any id is taken.
    pub fn put_all(&mut self, records: Vec<MetadataRecord>) -> Result<()> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if self.records.contains_key(&record.id) || !seen.insert(record.id) {
                return Err(LodestarError::DuplicateId(record.id));
            }
        }
        for record in records {
            self.records.insert(record.id, record);
        }
        Ok(())
    }

    /// Drop the given ids, returning how many were present.
    pub(crate) fn remove(&mut self, ids: &[u64]) -> usize {
        ids.iter().filter(|id| self.records.remove(id).is_some()).count()
    }

    /// Clear every record. Only the paired store may call this, so the
    /// index is always cleared alongside.
    pub(crate) fn reset(&mut self) {
        self.records.clear();
    }

    /// Write records to the backing file atomically. No-op for in-memory stores.
    #[instrument(skip(self))]
    pub fn persist(&self) -> Result<()> {
        let (Some(path), Some(backend)) = (&self.path, self.backend) else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = MetadataFile {
            backend,
            records: self.records.values().collect::<Vec<_>>(),
        };
        let bytes = bincode::serialize(&file)?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, path)?;

        debug!("Persisted {} metadata records", file.records.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, url: &str) -> MetadataRecord {
        MetadataRecord {
            id,
            source_url: url.to_string(),
            title: format!("Title {}", id),
            content_chunk: format!("chunk {}", id),
            chunk_index: 0,
            indexed_at: Utc::now(),
        }
    }

    #[test]
    fn test_put_rejects_duplicates() {
        let mut store = MetadataStore::in_memory();
        store.put(record(0, "a.com")).unwrap();
        assert!(matches!(
            store.put(record(0, "b.com")),
            Err(LodestarError::DuplicateId(0))
        ));
        assert_eq!(store.get(0).unwrap().source_url, "a.com");
        assert!(store.get(1).is_none());
    }

    #[test]
    fn test_put_all_is_all_or_nothing() {
        let mut store = MetadataStore::in_memory();
        store.put(record(2, "a.com")).unwrap();

        let err = store
            .put_all(vec![record(0, "b.com"), record(1, "b.com"), record(2, "b.com")])
            .unwrap_err();
        assert!(matches!(err, LodestarError::DuplicateId(2)));
        assert_eq!(store.ids(), vec![2]);

        assert!(store.put_all(vec![record(3, "c.com"), record(3, "c.com")]).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_persist_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta").join("metadata.bin");

        let mut store = MetadataStore::load(&path, IndexBackend::IdMap).unwrap();
        assert!(store.is_empty());
        store
            .put_all(vec![record(0, "a.com"), record(1, "b.com")])
            .unwrap();
        store.persist().unwrap();

        let loaded = MetadataStore::load(&path, IndexBackend::IdMap).unwrap();
        assert_eq!(loaded.ids(), vec![0, 1]);
        assert_eq!(loaded.get(1), store.get(1));
        assert_eq!(loaded.backend(), Some(IndexBackend::IdMap));

        assert!(matches!(
            MetadataStore::load(&path, IndexBackend::Sqlite),
            Err(LodestarError::BackendMismatch {
                expected: IndexBackend::Sqlite,
                found: IndexBackend::IdMap,
            })
        ));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.bin");
        std::fs::write(&path, [0xff; 7]).unwrap();
        assert!(matches!(
            MetadataStore::load(&path, IndexBackend::IdMap),
            Err(LodestarError::Metadata(_))
        ));
    }

    #[test]
    fn test_remove_and_reset() {
        let mut store = MetadataStore::in_memory();
        store
            .put_all(vec![record(0, "a"), record(1, "b"), record(2, "c")])
            .unwrap();
        assert_eq!(store.remove(&[1, 5]), 1);
        assert_eq!(store.ids(), vec![0, 2]);

        store.reset();
        assert!(store.is_empty());
        store.persist().unwrap();
    }
}
