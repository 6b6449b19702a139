//! Local storage for juriscope using SQLite
//!
//! Holds the embedded chunks of each corpus (one [`VectorIndex`] per corpus)
//! and the raw source documents fetched by bulk transfer.

pub mod documents;
pub mod vector_index;

pub use documents::{DocumentStore, SourceDocument, SqliteDocumentStore};
#[cfg(test)]
pub use documents::MockDocumentStore;
pub use vector_index::{EmbeddedChunk, SearchFilters, SearchHit, VectorIndex};

use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Embedding dimension mismatch: expected {expected}, got {got} (chunk {id})")]
    DimensionMismatch {
        id: String,
        expected: usize,
        got: usize,
    },

    #[error("Chunk {0} has an empty embedding")]
    EmptyEmbedding(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Persistence seam used by bulk import
#[cfg_attr(test, mockall::automock)]
pub trait ChunkStore: Send + Sync {
    /// Upsert a batch of chunks atomically
    fn put_batch(&self, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Number of stored chunks
    fn count(&self) -> Result<usize>;

    /// Ids of all stored chunks, without loading vectors
    fn all_ids(&self) -> Result<HashSet<String>>;

    /// Embedding dimensionality fixed by the first stored chunk
    fn dimensions(&self) -> Result<Option<usize>>;
}

/// Open a SQLite connection with the settings shared by every store
pub(crate) fn open_connection(path: &std::path::Path) -> Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}
