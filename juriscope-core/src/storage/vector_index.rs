//! Persistent vector index over one corpus
//!
//! Embedded chunks are stored in SQLite keyed by chunk id, with an index on
//! the owning document so per-document deletes never scan the table.
//! Similarity search is a full scan scored with cosine similarity; the
//! corpora are bounded and local, so no ANN structure is kept.

use super::{open_connection, ChunkStore, Result, StorageError};
use crate::corpus::Corpus;
use crate::embeddings::ChunkKind;
use crate::similarity::{cosine_similarity, rank_and_dedupe, Scored};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// A chunk of a source document together with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedChunk {
    pub id: String,
    /// Id of the parent document (article, precedent)
    pub owner_id: String,
    /// Partition key: source law for statutes, issuing court for case law
    #[serde(default)]
    pub corpus_tag: String,
    #[serde(default)]
    pub chunk_kind: ChunkKind,
    #[serde(default)]
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default = "default_total_chunks")]
    pub total_chunks: usize,
    /// Domain fields carried through untouched
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_total_chunks() -> usize {
    1
}

/// Categorical restrictions applied before ranking. Empty lists do not restrict.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub corpus_tags: Vec<String>,
    pub chunk_kinds: Vec<ChunkKind>,
}

impl SearchFilters {
    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            corpus_tags: tags.into_iter().map(Into::into).collect(),
            chunk_kinds: vec![],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.corpus_tags.is_empty() && self.chunk_kinds.is_empty()
    }

    pub fn matches(&self, chunk: &EmbeddedChunk) -> bool {
        let tag_ok = self.corpus_tags.is_empty()
            || self
                .corpus_tags
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&chunk.corpus_tag));
        let kind_ok = self.chunk_kinds.is_empty() || self.chunk_kinds.contains(&chunk.chunk_kind);
        tag_ok && kind_ok
    }
}

/// A chunk ranked by similarity to a query
pub type SearchHit = Scored<EmbeddedChunk>;

/// SQLite-backed store of embedded chunks for one corpus
pub struct VectorIndex {
    corpus: Corpus,
    conn: Mutex<Connection>,
}

const COLUMNS: &str =
    "id, owner_id, corpus_tag, chunk_kind, text, embedding, chunk_index, total_chunks, metadata";

impl VectorIndex {
    /// Open or create the index for `corpus` in the database at `path`
    pub fn open(path: &Path, corpus: Corpus) -> Result<Self> {
        let index = Self {
            corpus,
            conn: Mutex::new(open_connection(path)?),
        };
        index.migrate()?;
        Ok(index)
    }

    /// Create an in-memory index (for testing)
    pub fn in_memory(corpus: Corpus) -> Result<Self> {
        let index = Self {
            corpus,
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        index.migrate()?;
        Ok(index)
    }

    pub fn corpus(&self) -> Corpus {
        self.corpus
    }

    fn table(&self) -> &'static str {
        self.corpus.chunk_table()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn migrate(&self) -> Result<()> {
        let table = self.table();
        self.conn()?.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                corpus_tag TEXT NOT NULL DEFAULT '',
                chunk_kind TEXT NOT NULL DEFAULT 'whole',
                text TEXT NOT NULL DEFAULT '',
                embedding BLOB NOT NULL,
                chunk_index INTEGER NOT NULL DEFAULT 0,
                total_chunks INTEGER NOT NULL DEFAULT 1,
                metadata TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_owner ON {table}(owner_id);

            -- Dimensionality shared by every embedding of a corpus
            CREATE TABLE IF NOT EXISTS index_meta (
                corpus TEXT PRIMARY KEY,
                dimensions INTEGER NOT NULL
            );
            "#
        ))?;
        Ok(())
    }

    /// Embedding dimensionality of this index, if anything was stored yet
    pub fn dimensions(&self) -> Result<Option<usize>> {
        let conn = self.conn()?;
        Self::stored_dimensions(&conn, self.corpus)
    }

    fn stored_dimensions(conn: &Connection, corpus: Corpus) -> Result<Option<usize>> {
        let dims: Option<i64> = conn
            .query_row(
                "SELECT dimensions FROM index_meta WHERE corpus = ?1",
                params![corpus.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(dims.map(|d| d as usize))
    }

    /// Upsert a single chunk
    pub fn put(&self, chunk: &EmbeddedChunk) -> Result<()> {
        self.put_batch(std::slice::from_ref(chunk))
    }

    /// Upsert many chunks in one transaction
    pub fn put_batch(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        self.write_chunks(&tx, chunks)?;
        tx.commit()?;
        Ok(())
    }

    /// Swap the chunk set of one parent document in a single transaction.
    ///
    /// Returns how many old chunks were removed.
    pub fn replace_owner(&self, owner_id: &str, chunks: &[EmbeddedChunk]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            &format!("DELETE FROM {} WHERE owner_id = ?1", self.table()),
            params![owner_id],
        )?;
        self.write_chunks(&tx, chunks)?;
        tx.commit()?;
        Ok(removed)
    }

    fn write_chunks(&self, tx: &Transaction<'_>, chunks: &[EmbeddedChunk]) -> Result<()> {
        let Some(first) = chunks.first() else {
            return Ok(());
        };
        if let Some(empty) = chunks.iter().find(|c| c.embedding.is_empty()) {
            return Err(StorageError::EmptyEmbedding(empty.id.clone()));
        }

        let expected = match Self::stored_dimensions(tx, self.corpus)? {
            Some(dims) => dims,
            None => {
                let dims = first.embedding.len();
                tx.execute(
                    "INSERT INTO index_meta (corpus, dimensions) VALUES (?1, ?2)",
                    params![self.corpus.as_str(), dims as i64],
                )?;
                dims
            }
        };

        let mut stmt = tx.prepare(&format!(
            r#"
            INSERT INTO {} ({COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                corpus_tag = excluded.corpus_tag,
                chunk_kind = excluded.chunk_kind,
                text = excluded.text,
                embedding = excluded.embedding,
                chunk_index = excluded.chunk_index,
                total_chunks = excluded.total_chunks,
                metadata = excluded.metadata
            "#,
            self.table()
        ))?;

        for chunk in chunks {
            if chunk.embedding.len() != expected {
                // Dropping the transaction rolls the whole batch back
                return Err(StorageError::DimensionMismatch {
                    id: chunk.id.clone(),
                    expected,
                    got: chunk.embedding.len(),
                });
            }

            let metadata = if chunk.metadata.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&chunk.metadata)?)
            };

            stmt.execute(params![
                chunk.id,
                chunk.owner_id,
                chunk.corpus_tag,
                chunk.chunk_kind.as_str(),
                chunk.text,
                encode_embedding(&chunk.embedding),
                chunk.chunk_index as i64,
                chunk.total_chunks as i64,
                metadata,
            ])?;
        }

        Ok(())
    }

    pub fn get_all(&self) -> Result<Vec<EmbeddedChunk>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM {}", self.table()))?;
        let chunks = stmt
            .query_map([], row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    pub fn get_by_owner(&self, owner_id: &str) -> Result<Vec<EmbeddedChunk>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM {} WHERE owner_id = ?1 ORDER BY chunk_index ASC",
            self.table()
        ))?;
        let chunks = stmt
            .query_map(params![owner_id], row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    pub fn all_ids(&self) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT id FROM {}", self.table()))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table()), [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    /// Remove every chunk and forget the stored dimensionality
    pub fn clear_all(&self) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", self.table()), [])?;
        tx.execute(
            "DELETE FROM index_meta WHERE corpus = ?1",
            params![self.corpus.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Remove the chunks of one parent document, returning how many went
    pub fn clear_by_owner(&self, owner_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE owner_id = ?1", self.table()),
            params![owner_id],
        )?;
        Ok(removed)
    }

    /// Rank stored chunks against a query embedding.
    ///
    /// Filters are applied before ranking so a filtered-out chunk can never
    /// push an eligible one past `limit`. Each parent document appears at
    /// most once, represented by its best chunk.
    pub fn search_by_similarity(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        limit: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<SearchHit>> {
        let candidates = self
            .get_all()?
            .into_iter()
            .filter(|chunk| filters.map_or(true, |f| f.matches(chunk)));

        Ok(rank_and_dedupe(
            candidates,
            |chunk| cosine_similarity(query_embedding, &chunk.embedding),
            |chunk| chunk.owner_id.clone(),
            threshold,
            limit,
        ))
    }
}

impl ChunkStore for VectorIndex {
    fn put_batch(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        VectorIndex::put_batch(self, chunks)
    }

    fn count(&self) -> Result<usize> {
        VectorIndex::count(self)
    }

    fn all_ids(&self) -> Result<HashSet<String>> {
        VectorIndex::all_ids(self)
    }

    fn dimensions(&self) -> Result<Option<usize>> {
        VectorIndex::dimensions(self)
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<EmbeddedChunk> {
    let kind: String = row.get(3)?;
    let blob: Vec<u8> = row.get(5)?;
    let metadata: Option<String> = row.get(8)?;

    Ok(EmbeddedChunk {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        corpus_tag: row.get(2)?,
        chunk_kind: ChunkKind::parse(&kind).unwrap_or_default(),
        text: row.get(4)?,
        embedding: decode_embedding(&blob),
        chunk_index: row.get::<_, i64>(6)? as usize,
        total_chunks: row.get::<_, i64>(7)? as usize,
        metadata: metadata
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or_default(),
    })
}
