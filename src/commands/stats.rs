use super::open_index;
use juriscope_core::storage::{DocumentStore, SqliteDocumentStore};
use juriscope_core::{Corpus, EngineConfig, Preferences};

pub fn run(config: &EngineConfig) -> anyhow::Result<()> {
    let documents = SqliteDocumentStore::open(&config.database_path())?;
    let preferences = Preferences::load(&config.preferences_path());

    println!("Juriscope Statistics");
    println!("====================");
    println!();
    println!("Data directory: {}", config.data_dir.display());

    for corpus in Corpus::ALL {
        let index = open_index(config, corpus)?;
        let chunks = index.count()?;
        let owners = index
            .get_all()?
            .into_iter()
            .map(|c| c.owner_id)
            .collect::<std::collections::HashSet<_>>()
            .len();

        println!();
        println!("{}:", corpus);
        println!("  Chunks:           {} ({} documents)", chunks, owners);
        if let Some(dim) = index.dimensions()? {
            println!("  Dimensions:       {}", dim);
        }
        println!("  Source documents: {}", documents.count(corpus)?);
        println!(
            "  Semantic search:  {}",
            if preferences.search_enabled(corpus) {
                "enabled"
            } else {
                "disabled"
            }
        );
        if preferences.prompt_dismissed(corpus) {
            println!("  Download prompt dismissed");
        }
    }

    Ok(())
}
