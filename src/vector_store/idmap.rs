//! ID-mapped flat index with binary persistence.
//!
//! Vectors live in one contiguous `f32` buffer with a parallel id array.
//! A slot map resolves ids to buffer positions, so ids never depend on
//! insertion order and removal leaves no holes in the id space.

use super::{dot, prepare_batch, prepare_query, top_k, IndexBackend, Neighbor, VectorIndex};
use crate::error::{LodestarError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Snapshot format version written by [`IdMapIndex::persist`].
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    dimension: usize,
    ids: Vec<u64>,
    data: Vec<f32>,
}

/// Flat inner-product index addressed by caller-assigned ids.
pub struct IdMapIndex {
    dimension: usize,
    path: Option<PathBuf>,
    ids: Vec<u64>,
    data: Vec<f32>,
    slots: HashMap<u64, usize>,
}

impl IdMapIndex {
    /// Create an empty index, persisted to `path` if given.
    pub fn new(path: Option<PathBuf>, dimension: usize) -> Self {
        Self {
            dimension,
            path,
            ids: Vec::new(),
            data: Vec::new(),
            slots: HashMap::new(),
        }
    }

    /// Load an index from `path`. A missing file yields an empty index.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path, dimension: usize) -> Result<Self> {
        if !path.exists() {
            debug!("No index file, starting empty");
            return Ok(Self::new(Some(path.to_path_buf()), dimension));
        }

        let bytes = std::fs::read(path)?;
        let snapshot: Snapshot = bincode::deserialize(&bytes)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LodestarError::VectorStore(format!(
                "Unsupported index version {}",
                snapshot.version
            )));
        }
        if snapshot.dimension != dimension {
            return Err(LodestarError::DimensionMismatch {
                expected: dimension,
                actual: snapshot.dimension,
            });
        }
        if snapshot.data.len() != snapshot.ids.len() * dimension {
            return Err(LodestarError::VectorStore(format!(
                "Index holds {} floats for {} ids",
                snapshot.data.len(),
                snapshot.ids.len()
            )));
        }

        let mut slots = HashMap::with_capacity(snapshot.ids.len());
        for (slot, &id) in snapshot.ids.iter().enumerate() {
            if slots.insert(id, slot).is_some() {
                return Err(LodestarError::DuplicateId(id));
            }
        }

        info!("Loaded {} vectors from index", snapshot.ids.len());

        Ok(Self {
            dimension,
            path: Some(path.to_path_buf()),
            ids: snapshot.ids,
            data: snapshot.data,
            slots,
        })
    }

    /// Write the index to `path` atomically.
    pub fn persist_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            dimension: self.dimension,
            ids: self.ids.clone(),
            data: self.data.clone(),
        };
        let bytes = bincode::serialize(&snapshot)?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, path)?;

        debug!("Persisted {} vectors to {}", self.ids.len(), path.display());
        Ok(())
    }

    fn vector(&self, slot: usize) -> &[f32] {
        &self.data[slot * self.dimension..(slot + 1) * self.dimension]
    }
}

impl VectorIndex for IdMapIndex {
    fn backend(&self) -> IndexBackend {
        IndexBackend::IdMap
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> Result<usize> {
        Ok(self.ids.len())
    }

    fn ids(&self) -> Result<Vec<u64>> {
        let mut ids = self.ids.clone();
        ids.sort_unstable();
        Ok(ids)
    }

    fn add(&mut self, vectors: &[Vec<f32>], ids: &[u64]) -> Result<()> {
        let normalized = prepare_batch(self.dimension, vectors, ids)?;
        if let Some(&id) = ids.iter().find(|id| self.slots.contains_key(id)) {
            return Err(LodestarError::DuplicateId(id));
        }

        self.data.reserve(normalized.len() * self.dimension);
        for (id, vector) in ids.iter().zip(normalized) {
            self.slots.insert(*id, self.ids.len());
            self.ids.push(*id);
            self.data.extend_from_slice(&vector);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if self.ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query = prepare_query(self.dimension, query)?;

        let hits = self
            .ids
            .iter()
            .enumerate()
            .map(|(slot, &id)| Neighbor {
                id,
                score: dot(&query, self.vector(slot)),
            })
            .collect();

        Ok(top_k(hits, k))
    }

    fn remove(&mut self, ids: &[u64]) -> Result<usize> {
        let doomed: HashSet<u64> = ids.iter().copied().collect();
        let before = self.ids.len();
        if doomed.is_empty() {
            return Ok(0);
        }

        let dimension = self.dimension;
        let mut kept_ids = Vec::with_capacity(before);
        let mut kept_data = Vec::with_capacity(self.data.len());
        for (slot, &id) in self.ids.iter().enumerate() {
            if !doomed.contains(&id) {
                kept_ids.push(id);
                kept_data.extend_from_slice(&self.data[slot * dimension..(slot + 1) * dimension]);
            }
        }

        self.slots = kept_ids.iter().enumerate().map(|(slot, &id)| (id, slot)).collect();
        self.ids = kept_ids;
        self.data = kept_data;

        Ok(before - self.ids.len())
    }

    fn reset(&mut self) -> Result<()> {
        self.ids.clear();
        self.data.clear();
        self.slots.clear();
        Ok(())
    }

    #[instrument(skip(self))]
    fn persist(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.persist_to(path),
            None => Ok(()),
        }
    }
}
