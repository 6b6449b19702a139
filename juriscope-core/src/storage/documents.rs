//! Raw source documents (statute articles, precedents)
//!
//! The document schema belongs to the legal domain and is kept opaque: each
//! record is stored as JSON under its corpus and id.

use super::{open_connection, Result, StorageError};
use crate::corpus::Corpus;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// An opaque source document
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub id: String,
    pub payload: serde_json::Value,
}

/// Store for raw source documents, one partition per corpus
#[cfg_attr(test, mockall::automock)]
pub trait DocumentStore: Send + Sync {
    /// Number of documents stored for a corpus
    fn count(&self, corpus: Corpus) -> Result<usize>;

    /// Upsert a batch of documents atomically
    fn put_batch(&self, corpus: Corpus, documents: &[SourceDocument]) -> Result<()>;
}

/// SQLite implementation of [`DocumentStore`]
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    pub fn open(path: &Path) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(open_connection(path)?),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS source_documents (
                corpus TEXT NOT NULL,
                id TEXT NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (corpus, id)
            );
            "#,
        )?;
        Ok(())
    }

    pub fn get(&self, corpus: Corpus, id: &str) -> Result<Option<SourceDocument>> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM source_documents WHERE corpus = ?1 AND id = ?2",
                params![corpus.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|p| -> Result<SourceDocument> {
                Ok(SourceDocument {
                    id: id.to_string(),
                    payload: serde_json::from_str(&p)?,
                })
            })
            .transpose()
    }

    pub fn clear(&self, corpus: Corpus) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM source_documents WHERE corpus = ?1",
            params![corpus.as_str()],
        )?;
        Ok(())
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn count(&self, corpus: Corpus) -> Result<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM source_documents WHERE corpus = ?1",
            params![corpus.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn put_batch(&self, corpus: Corpus, documents: &[SourceDocument]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO source_documents (corpus, id, payload)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(corpus, id) DO UPDATE SET payload = excluded.payload
                "#,
            )?;
            for doc in documents {
                stmt.execute(params![
                    corpus.as_str(),
                    doc.id,
                    serde_json::to_string(&doc.payload)?
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str) -> SourceDocument {
        SourceDocument {
            id: id.to_string(),
            payload: json!({ "id": id, "texto": "Art. 5º Todos são iguais perante a lei" }),
        }
    }

    #[test]
    fn test_put_and_count() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        store
            .put_batch(Corpus::Legislation, &[doc("a"), doc("b")])
            .unwrap();

        assert_eq!(store.count(Corpus::Legislation).unwrap(), 2);
        assert_eq!(store.count(Corpus::CaseLaw).unwrap(), 0);
    }

    #[test]
    fn test_upsert() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        store.put_batch(Corpus::CaseLaw, &[doc("a")]).unwrap();

        let updated = SourceDocument {
            id: "a".to_string(),
            payload: json!({ "id": "a", "texto": "revised" }),
        };
        store.put_batch(Corpus::CaseLaw, &[updated.clone()]).unwrap();

        assert_eq!(store.count(Corpus::CaseLaw).unwrap(), 1);
        assert_eq!(store.get(Corpus::CaseLaw, "a").unwrap(), Some(updated));
    }

    #[test]
    fn test_get_missing() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        assert_eq!(store.get(Corpus::Legislation, "nope").unwrap(), None);
    }

    #[test]
    fn test_clear_is_per_corpus() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        store.put_batch(Corpus::Legislation, &[doc("a")]).unwrap();
        store.put_batch(Corpus::CaseLaw, &[doc("a")]).unwrap();

        store.clear(Corpus::Legislation).unwrap();

        assert_eq!(store.count(Corpus::Legislation).unwrap(), 0);
        assert_eq!(store.count(Corpus::CaseLaw).unwrap(), 1);
    }
}
