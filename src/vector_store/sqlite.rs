//! SQLite-backed vector index.
//!
//! Vectors are stored as little-endian BLOBs keyed by id, with similarity
//! computed in Rust. Every write runs in a transaction, so the database is
//! always durable and `persist` has nothing to do.

use super::{dot, prepare_batch, prepare_query, top_k, IndexBackend, Neighbor, VectorIndex};
use crate::error::{LodestarError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS vectors (
        id INTEGER PRIMARY KEY,
        embedding BLOB NOT NULL
    );

    CREATE TABLE IF NOT EXISTS index_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

/// SQLite-based vector index.
pub struct SqliteIndex {
    conn: Connection,
    dimension: usize,
}

impl SqliteIndex {
    /// Open (or create) the database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let index = Self::with_connection(conn, dimension)?;

        info!("Opened SQLite vector index at {:?}", path);
        Ok(index)
    }

    /// Create an in-memory SQLite index (useful for testing).
    pub fn in_memory(dimension: usize) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, dimension)
    }

    fn with_connection(conn: Connection, dimension: usize) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'dimension'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(value) => {
                let actual: usize = value.parse().map_err(|_| {
                    LodestarError::VectorStore(format!("Invalid stored dimension: {}", value))
                })?;
                if actual != dimension {
                    return Err(LodestarError::DimensionMismatch {
                        expected: dimension,
                        actual,
                    });
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO index_meta (key, value) VALUES ('dimension', ?1)",
                    params![dimension.to_string()],
                )?;
            }
        }

        Ok(Self { conn, dimension })
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    fn contains(&self, id: u64) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM vectors WHERE id = ?1",
                params![id as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl VectorIndex for SqliteIndex {
    fn backend(&self) -> IndexBackend {
        IndexBackend::Sqlite
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn ids(&self) -> Result<Vec<u64>> {
        let mut stmt = self.conn.prepare("SELECT id FROM vectors ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .map(|id| id.map(|id| id as u64))
            .collect::<rusqlite::Result<Vec<u64>>>()?;
        Ok(ids)
    }

    #[instrument(skip(self, vectors, ids), fields(count = ids.len()))]
    fn add(&mut self, vectors: &[Vec<f32>], ids: &[u64]) -> Result<()> {
        let normalized = prepare_batch(self.dimension, vectors, ids)?;
        for &id in ids {
            if self.contains(id)? {
                return Err(LodestarError::DuplicateId(id));
            }
        }

        let tx = self.conn.transaction()?;
        for (id, vector) in ids.iter().zip(&normalized) {
            tx.execute(
                "INSERT INTO vectors (id, embedding) VALUES (?1, ?2)",
                params![*id as i64, Self::embedding_to_bytes(vector)],
            )?;
        }
        tx.commit()?;

        debug!("Inserted {} vectors", ids.len());
        Ok(())
    }

    #[instrument(skip(self, query))]
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = prepare_query(self.dimension, query)?;

        let mut stmt = self.conn.prepare("SELECT id, embedding FROM vectors")?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            Ok((id as u64, Self::bytes_to_embedding(&bytes)))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, vector) = row?;
            hits.push(Neighbor {
                id,
                score: dot(&query, &vector),
            });
        }

        debug!("Scored {} vectors", hits.len());
        Ok(top_k(hits, k))
    }

    fn remove(&mut self, ids: &[u64]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut removed = 0;
        for &id in ids {
            removed += tx.execute("DELETE FROM vectors WHERE id = ?1", params![id as i64])?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn reset(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM vectors", [])?;
        info!("Cleared SQLite vector index");
        Ok(())
    }
}
