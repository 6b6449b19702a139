use anyhow::Context;
use juriscope_core::lexical::{LibraryDocument, SimilarityConfig};
use juriscope_core::LexicalSimilarityIndex;
use std::path::Path;

pub fn run(library: &Path, candidate: &Path, threshold: Option<f32>) -> anyhow::Result<()> {
    let documents: Vec<LibraryDocument> = read_json(library)?;
    let candidate: LibraryDocument = read_json(candidate)?;

    let mut config = SimilarityConfig::default();
    if let Some(threshold) = threshold {
        config.threshold = threshold;
    }
    let mut index = LexicalSimilarityIndex::new(config);

    match index.find_similar(&candidate, &documents) {
        Some(found) => {
            let title = if found.document.title.is_empty() {
                found.document.id.as_str()
            } else {
                found.document.title.as_str()
            };
            println!(
                "Near-duplicate of {} ({}), similarity {:.3}",
                found.document.id, title, found.similarity
            );
        }
        None => println!("No near-duplicate found."),
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}
