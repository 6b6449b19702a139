mod commands;

use clap::{Parser, Subcommand};
use juriscope_core::{Corpus, EngineConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "juriscope")]
#[command(about = "Local semantic retrieval over statutes and case law", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a corpus snapshot from the CDN
    Download {
        /// Corpus to download (legislation, case-law)
        corpus: Corpus,

        /// Download the raw source documents instead of the embeddings
        #[arg(long)]
        data: bool,

        /// Override the CDN proxy URL
        #[arg(long)]
        proxy_url: Option<String>,
    },

    /// Import an embeddings snapshot from a local file
    Import {
        /// Corpus to import into (legislation, case-law)
        corpus: Corpus,

        /// Path to the embeddings JSON file
        path: PathBuf,
    },

    /// Embed a source document and store it in a corpus index
    Index {
        /// Corpus to index into (legislation, case-law)
        corpus: Corpus,

        /// Id of the article or precedent
        owner_id: String,

        /// Path to the document text
        path: PathBuf,

        /// Source law or issuing court
        #[arg(long, default_value = "")]
        tag: String,

        /// Use the deterministic mock model instead of the ONNX model
        #[arg(long)]
        mock: bool,
    },

    /// Semantic search over a corpus
    Search {
        /// Corpus to search (legislation, case-law)
        corpus: Corpus,

        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Minimum cosine similarity
        #[arg(long, default_value = "0.3")]
        threshold: f32,

        /// Restrict to a source law or court (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Use the deterministic mock model instead of the ONNX model
        #[arg(long)]
        mock: bool,
    },

    /// Extract named entities from a text file
    Entities {
        /// Path to the text file
        path: PathBuf,

        /// Use the mock recognizer instead of the ONNX model
        #[arg(long)]
        mock: bool,

        /// Phrase the mock recognizer reports, as PHRASE=LABEL (repeatable)
        #[arg(long = "mock-entity", requires = "mock")]
        mock_entities: Vec<String>,
    },

    /// Check a document against a library for near-duplicates
    Dedupe {
        /// JSON array of library documents
        library: PathBuf,

        /// JSON candidate document
        candidate: PathBuf,

        /// Similarity threshold (defaults to 0.80)
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Show statistics
    Stats,
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("juriscope=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = cli.data_dir.map(EngineConfig::new).unwrap_or_default();

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    match cli.command {
        Commands::Download {
            corpus,
            data,
            proxy_url,
        } => {
            commands::download::run(corpus, data, proxy_url, &config).await?;
        }
        Commands::Import { corpus, path } => {
            commands::import::run(corpus, &path, &config).await?;
        }
        Commands::Index {
            corpus,
            owner_id,
            path,
            tag,
            mock,
        } => {
            commands::index::run(corpus, &owner_id, &path, &tag, mock, &config).await?;
        }
        Commands::Search {
            corpus,
            query,
            limit,
            threshold,
            tags,
            mock,
        } => {
            commands::search::run(corpus, &query, limit, threshold, tags, mock, &config).await?;
        }
        Commands::Entities {
            path,
            mock,
            mock_entities,
        } => {
            commands::entities::run(&path, mock, &mock_entities, &config).await?;
        }
        Commands::Dedupe {
            library,
            candidate,
            threshold,
        } => {
            commands::dedupe::run(&library, &candidate, threshold)?;
        }
        Commands::Stats => {
            commands::stats::run(&config)?;
        }
    }

    Ok(())
}
