use super::{open_index, search_client};
use juriscope_core::inference::{EmbeddingPurpose, ModelKind};
use juriscope_core::storage::SearchFilters;
use juriscope_core::{Corpus, EngineConfig};

pub async fn run(
    corpus: Corpus,
    query: &str,
    limit: usize,
    threshold: f32,
    tags: Vec<String>,
    mock: bool,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let index = open_index(config, corpus)?;
    if index.count()? == 0 {
        println!("No {} chunks stored.", corpus);
        println!("\nTip: Run `juriscope download {}` first.", corpus);
        return Ok(());
    }

    let client = search_client(&index, mock, config)?;

    println!("Searching {} for: {}\n", corpus, query);

    if let Err(e) = client.init(ModelKind::Search).await {
        eprintln!("Failed to load embedding model: {}", e);
        eprintln!(
            "Place the model files in {} or use --mock.",
            config.models_dir().display()
        );
        client.cleanup();
        return Ok(());
    }

    let query_embedding = client.embed(query, EmbeddingPurpose::Query).await;
    client.cleanup();
    let query_embedding = query_embedding?;

    let filters = SearchFilters::with_tags(tags);
    let filters = (!filters.is_empty()).then_some(&filters);
    let hits = index.search_by_similarity(&query_embedding, threshold, limit, filters)?;

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} results:\n", hits.len());

    for hit in hits {
        let chunk = &hit.item;
        let tag = if chunk.corpus_tag.is_empty() {
            String::new()
        } else {
            format!(" [{}]", chunk.corpus_tag)
        };
        println!("{}{} (score: {:.3})", chunk.owner_id, tag, hit.score);
        if !chunk.text.is_empty() {
            println!("   {}", truncate(&chunk.text, 80));
        }
        if chunk.total_chunks > 1 {
            println!("   chunk {}/{}", chunk.chunk_index + 1, chunk.total_chunks);
        }
        println!();
    }

    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", head)
    }
}
