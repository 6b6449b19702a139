use super::transfer_service;
use anyhow::Context;
use juriscope_core::transfer::TransferConfig;
use juriscope_core::{Corpus, EngineConfig};
use std::path::Path;

pub async fn run(corpus: Corpus, path: &Path, config: &EngineConfig) -> anyhow::Result<()> {
    let payload = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let service = transfer_service(config, TransferConfig::default())?;
    let count = service
        .import_embeddings(corpus, &payload, |done, total| {
            eprint!("\r  stored {}/{}", done, total);
        })
        .await?;
    eprintln!();

    println!("Imported {} chunks into {}.", count, corpus);
    Ok(())
}
