//! Vector index abstraction for Lodestar.
//!
//! Every backend stores vectors under caller-assigned integer ids and ranks
//! them by cosine similarity. Vectors are L2-normalized on the way in and
//! queries are normalized the same way, so inner product equals cosine.

mod idmap;
mod memory;
mod sqlite;

pub use idmap::IdMapIndex;
pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

use crate::config::Settings;
use crate::error::{LodestarError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// A search hit: the id of a stored vector and its similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: u64,
    /// Cosine similarity (higher is better).
    pub score: f32,
}

/// Index backend selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// ID-mapped flat index persisted to a binary file.
    #[default]
    IdMap,
    /// Flat list scanned in memory, never persisted.
    Memory,
    /// Vectors stored as rows in a SQLite database.
    Sqlite,
}

impl std::str::FromStr for IndexBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idmap" | "id_map" => Ok(IndexBackend::IdMap),
            "memory" => Ok(IndexBackend::Memory),
            "sqlite" => Ok(IndexBackend::Sqlite),
            _ => Err(format!("Unknown index backend: {}", s)),
        }
    }
}

impl std::fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexBackend::IdMap => write!(f, "idmap"),
            IndexBackend::Memory => write!(f, "memory"),
            IndexBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Trait for vector index implementations.
pub trait VectorIndex: Send {
    /// Which backend this is.
    fn backend(&self) -> IndexBackend;

    /// Dimension every stored vector must have.
    fn dimension(&self) -> usize;

    /// Number of stored vectors.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// All stored ids in ascending order.
    fn ids(&self) -> Result<Vec<u64>>;

    /// Store `vectors` under `ids`.
    ///
    /// Fails without storing anything if the lengths differ, an id is already
    /// present, a dimension is wrong, or a vector has zero norm.
    fn add(&mut self, vectors: &[Vec<f32>], ids: &[u64]) -> Result<()>;

    /// Return up to `k` ids ordered by descending similarity to `query`.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Drop the given ids, returning how many were present.
    fn remove(&mut self, ids: &[u64]) -> Result<usize>;

    /// Discard every vector, keeping the dimension.
    fn reset(&mut self) -> Result<()>;

    /// Write the index to durable storage.
    fn persist(&self) -> Result<()> {
        Ok(())
    }
}

/// Open the configured backend, loading any persisted state.
pub fn open_index(settings: &Settings) -> Result<Box<dyn VectorIndex>> {
    let dimension = settings.embedding.dimensions as usize;
    Ok(match settings.vector_store.backend {
        IndexBackend::IdMap => Box::new(IdMapIndex::load(&settings.index_path(), dimension)?),
        IndexBackend::Memory => Box::new(MemoryIndex::new(dimension)),
        IndexBackend::Sqlite => Box::new(SqliteIndex::new(&settings.sqlite_path(), dimension)?),
    })
}

/// Create the configured backend with no vectors, ignoring persisted state.
pub fn empty_index(settings: &Settings) -> Result<Box<dyn VectorIndex>> {
    let dimension = settings.embedding.dimensions as usize;
    Ok(match settings.vector_store.backend {
        IndexBackend::IdMap => Box::new(IdMapIndex::new(Some(settings.index_path()), dimension)),
        IndexBackend::Memory => Box::new(MemoryIndex::new(dimension)),
        IndexBackend::Sqlite => {
            let path = settings.sqlite_path();
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            Box::new(SqliteIndex::new(&path, dimension)?)
        }
    })
}


/// Euclidean length of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length. Returns `None` for zero or non-finite norms.
pub fn normalize(v: &[f32]) -> Option<Vec<f32>> {
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    Some(v.iter().map(|x| x / norm).collect())
}

/// Inner product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot(a, b) / (norm_a * norm_b)
}

/// Validate an insert batch and return its normalized vectors.
pub(crate) fn prepare_batch(
    dimension: usize,
    vectors: &[Vec<f32>],
    ids: &[u64],
) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != ids.len() {
        return Err(LodestarError::VectorStore(format!(
            "Got {} vectors for {} ids",
            vectors.len(),
            ids.len()
        )));
    }

    let mut seen = HashSet::with_capacity(ids.len());
    for &id in ids {
        if !seen.insert(id) {
            return Err(LodestarError::DuplicateId(id));
        }
    }

    vectors
        .iter()
        .zip(ids)
        .map(|(vector, id)| {
            if vector.len() != dimension {
                return Err(LodestarError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            normalize(vector).ok_or_else(|| {
                LodestarError::InvalidInput(format!("Vector for id {} has zero norm", id))
            })
        })
        .collect()
}

/// Validate and normalize a query vector.
pub(crate) fn prepare_query(dimension: usize, query: &[f32]) -> Result<Vec<f32>> {
    if query.len() != dimension {
        return Err(LodestarError::DimensionMismatch {
            expected: dimension,
            actual: query.len(),
        });
    }
    normalize(query)
        .ok_or_else(|| LodestarError::InvalidInput("Query vector has zero norm".to_string()))
}

/// Keep the `k` best hits, highest score first and lower ids winning ties.
pub(crate) fn top_k(mut hits: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    hits.truncate(k);
    hits
}
