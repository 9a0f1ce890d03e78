//! In-memory vector index.
//!
//! A flat list of entries scanned on every query. Useful for testing and
//! throwaway sessions; nothing is written to disk.

use super::{prepare_batch, prepare_query, top_k, dot, IndexBackend, Neighbor, VectorIndex};
use crate::error::{LodestarError, Result};
use std::collections::HashSet;

/// In-memory flat index.
pub struct MemoryIndex {
    dimension: usize,
    entries: Vec<(u64, Vec<f32>)>,
}

impl MemoryIndex {
    /// Create an empty index for vectors of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
        }
    }

    fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == id)
    }
}

impl VectorIndex for MemoryIndex {
    fn backend(&self) -> IndexBackend {
        IndexBackend::Memory
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    fn ids(&self) -> Result<Vec<u64>> {
        let mut ids: Vec<u64> = self.entries.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn add(&mut self, vectors: &[Vec<f32>], ids: &[u64]) -> Result<()> {
        let normalized = prepare_batch(self.dimension, vectors, ids)?;
        if let Some(&id) = ids.iter().find(|&&id| self.contains(id)) {
            return Err(LodestarError::DuplicateId(id));
        }

        self.entries.extend(ids.iter().copied().zip(normalized));
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query = prepare_query(self.dimension, query)?;

        let hits = self
            .entries
            .iter()
            .map(|(id, vector)| Neighbor {
                id: *id,
                score: dot(&query, vector),
            })
            .collect();

        Ok(top_k(hits, k))
    }

    fn remove(&mut self, ids: &[u64]) -> Result<usize> {
        let doomed: HashSet<u64> = ids.iter().copied().collect();
        let before = self.entries.len();
        self.entries.retain(|(id, _)| !doomed.contains(id));
        Ok(before - self.entries.len())
    }

    fn reset(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_index() {
        let mut index = MemoryIndex::new(3);

        index
            .add(&[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]], &[7, 3])
            .unwrap();
        assert_eq!(index.len().unwrap(), 2);
        assert_eq!(index.ids().unwrap(), vec![3, 7]);

        let results = index.search(&[1.0, 0.1, 0.0], 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 7);
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_rejects_existing_id() {
        let mut index = MemoryIndex::new(2);
        index.add(&[vec![1.0, 0.0]], &[0]).unwrap();

        let err = index.add(&[vec![0.0, 1.0], vec![1.0, 1.0]], &[1, 0]).unwrap_err();
        assert!(matches!(err, LodestarError::DuplicateId(0)));
        assert_eq!(index.len().unwrap(), 1);
    }

    #[test]
    fn test_remove_and_reset() {
        let mut index = MemoryIndex::new(2);
        index
            .add(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]], &[0, 1, 2])
            .unwrap();

        assert_eq!(index.remove(&[1, 9]).unwrap(), 1);
        assert_eq!(index.ids().unwrap(), vec![0, 2]);

        index.reset().unwrap();
        index.reset().unwrap();
        assert!(index.is_empty().unwrap());
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
        assert_eq!(index.dimension(), 2);
    }
}
