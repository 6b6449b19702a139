use super::{open_index, search_client};
use anyhow::Context;
use juriscope_core::embeddings::TextChunker;
use juriscope_core::indexing::IndexRequest;
use juriscope_core::{Corpus, DocumentIndexer, EngineConfig};
use std::path::Path;

pub async fn run(
    corpus: Corpus,
    owner_id: &str,
    path: &Path,
    tag: &str,
    mock: bool,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let index = open_index(config, corpus)?;
    let client = search_client(&index, mock, config)?;
    let indexer = DocumentIndexer::new(client, TextChunker::default());

    let result = indexer
        .index_document(
            &index,
            IndexRequest {
                owner_id,
                corpus_tag: tag,
                text: &text,
            },
        )
        .await;
    indexer.client().cleanup();
    let stored = result?;

    println!("Indexed {} as {} chunk(s) in {}.", owner_id, stored, corpus);
    Ok(())
}
