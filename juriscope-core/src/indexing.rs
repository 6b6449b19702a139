//! On-demand embedding of source documents
//!
//! Chunks a document, embeds every chunk as a passage and replaces the
//! document's previous chunk set in its vector index.

use crate::embeddings::TextChunker;
use crate::inference::{EmbeddingPurpose, InferenceClient, InferenceError, ModelKind};
use crate::storage::{EmbeddedChunk, StorageError, VectorIndex};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, IndexingError>;

/// A document to embed
#[derive(Debug, Clone)]
pub struct IndexRequest<'a> {
    /// Id of the article or precedent; chunk ids derive from it
    pub owner_id: &'a str,
    /// Source law or issuing court
    pub corpus_tag: &'a str,
    pub text: &'a str,
}

pub struct DocumentIndexer {
    client: InferenceClient,
    chunker: TextChunker,
}

impl DocumentIndexer {
    pub fn new(client: InferenceClient, chunker: TextChunker) -> Self {
        Self { client, chunker }
    }

    pub fn client(&self) -> &InferenceClient {
        &self.client
    }

    /// Embed a document and swap it into the index.
    ///
    /// The old chunk set of the same owner is removed in the same
    /// transaction, so a shorter revision never leaves stale chunks behind.
    /// A blank text removes the document. Returns the number of chunks stored.
    pub async fn index_document(&self, index: &VectorIndex, request: IndexRequest<'_>) -> Result<usize> {
        if request.text.trim().is_empty() {
            let removed = index.replace_owner(request.owner_id, &[])?;
            debug!(owner = request.owner_id, removed, "blank document removed from index");
            return Ok(0);
        }

        self.client.init(ModelKind::Search).await?;

        let pieces = self.chunker.chunk(request.text);
        let mut chunks = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let embedding = self
                .client
                .embed(&piece.text, EmbeddingPurpose::Passage)
                .await?;
            chunks.push(EmbeddedChunk {
                id: format!("{}#{}", request.owner_id, piece.chunk_index),
                owner_id: request.owner_id.to_string(),
                corpus_tag: request.corpus_tag.to_string(),
                chunk_kind: piece.kind,
                text: piece.text,
                embedding,
                chunk_index: piece.chunk_index,
                total_chunks: piece.total_chunks,
                metadata: serde_json::Map::new(),
            });
        }

        let removed = index.replace_owner(request.owner_id, &chunks)?;
        info!(
            corpus = %index.corpus(),
            owner = request.owner_id,
            stored = chunks.len(),
            removed,
            "document indexed"
        );
        Ok(chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::embeddings::{ChunkKind, ChunkerConfig, MockBackend};
    use crate::inference::InferenceConfig;
    use crate::similarity::cosine_similarity;

    fn indexer(backend: MockBackend) -> DocumentIndexer {
        let client = InferenceClient::with_backend(InferenceConfig::default(), move || backend.clone());
        let chunker = TextChunker::new(ChunkerConfig {
            threshold_chars: 120,
            window_chars: 60,
            overlap_chars: 10,
            min_chunk_chars: 5,
            min_thesis_chars: 50,
        });
        DocumentIndexer::new(client, chunker)
    }

    fn request<'a>(owner_id: &'a str, text: &'a str) -> IndexRequest<'a> {
        IndexRequest {
            owner_id,
            corpus_tag: "CC",
            text,
        }
    }

    #[tokio::test]
    async fn test_index_document_embeds_passages() {
        let backend = MockBackend::new(32);
        let indexer = indexer(backend.clone());
        let index = VectorIndex::in_memory(Corpus::Legislation).unwrap();
        let text = "Art. 186. Aquele que causar dano a outrem comete ato ilícito.";

        let stored = indexer
            .index_document(&index, request("art-186", text))
            .await
            .unwrap();

        assert_eq!(stored, 1);
        let chunks = index.get_by_owner("art-186").unwrap();
        assert_eq!(chunks[0].id, "art-186#0");
        assert_eq!(chunks[0].corpus_tag, "CC");
        assert_eq!(chunks[0].chunk_kind, ChunkKind::Whole);
        let expected = backend.embed_text(&format!("passage: {text}"));
        assert!(cosine_similarity(&chunks[0].embedding, &expected) > 0.9999);
    }

    #[tokio::test]
    async fn test_reindex_replaces_chunk_set() {
        let indexer = indexer(MockBackend::new(16));
        let index = VectorIndex::in_memory(Corpus::Legislation).unwrap();
        indexer
            .index_document(&index, request("art-5", "Todos são iguais perante a lei."))
            .await
            .unwrap();

        let long = "O locatário é obrigado a pagar pontualmente o aluguel e os encargos. ".repeat(4);
        let first = indexer
            .index_document(&index, request("art-23", &long))
            .await
            .unwrap();
        assert!(first > 1);
        assert_eq!(index.get_by_owner("art-23").unwrap().len(), first);

        let second = indexer
            .index_document(&index, request("art-23", "O locatário deve pagar o aluguel."))
            .await
            .unwrap();

        assert_eq!(second, 1);
        let chunks = index.get_by_owner("art-23").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].text, "O locatário deve pagar o aluguel.");
        assert_eq!(index.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_long_document_chunks_report_total() {
        let indexer = indexer(MockBackend::new(16));
        let index = VectorIndex::in_memory(Corpus::CaseLaw).unwrap();
        let long = "A prescrição intercorrente exige inércia do exequente. ".repeat(5);

        let stored = indexer
            .index_document(&index, request("resp-1", &long))
            .await
            .unwrap();

        let chunks = index.get_by_owner("resp-1").unwrap();
        assert_eq!(chunks.len(), stored);
        assert!(chunks.iter().all(|c| c.total_chunks == stored));
        assert!(chunks.iter().all(|c| c.chunk_kind == ChunkKind::Window));
    }

    #[tokio::test]
    async fn test_blank_document_removes_owner() {
        let indexer = indexer(MockBackend::new(16));
        let index = VectorIndex::in_memory(Corpus::Legislation).unwrap();
        indexer
            .index_document(&index, request("art-1", "Texto original."))
            .await
            .unwrap();

        let stored = indexer
            .index_document(&index, request("art-1", "   "))
            .await
            .unwrap();

        assert_eq!(stored, 0);
        assert!(index.get_by_owner("art-1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_keeps_old_chunks() {
        let index = VectorIndex::in_memory(Corpus::Legislation).unwrap();
        indexer(MockBackend::new(16))
            .index_document(&index, request("art-1", "Texto original."))
            .await
            .unwrap();

        let result = indexer(MockBackend::new(16).failing_load())
            .index_document(&index, request("art-1", "Texto revisado."))
            .await;

        assert!(matches!(result, Err(IndexingError::Inference(_))));
        assert_eq!(index.get_by_owner("art-1").unwrap()[0].text, "Texto original.");
    }
}
