pub mod dedupe;
pub mod download;
pub mod entities;
pub mod import;
pub mod index;
pub mod search;
pub mod stats;

use juriscope_core::embeddings::{MockBackend, OnnxBackend};
use juriscope_core::storage::{SqliteDocumentStore, VectorIndex};
use juriscope_core::transfer::{BulkTransferService, TransferConfig};
use juriscope_core::{Corpus, EngineConfig, InferenceClient, InferenceConfig};
use std::sync::Arc;

pub fn open_index(config: &EngineConfig, corpus: Corpus) -> anyhow::Result<VectorIndex> {
    Ok(VectorIndex::open(&config.database_path(), corpus)?)
}

/// Embedding width of multilingual-e5-small
const DEFAULT_MOCK_DIM: usize = 384;

/// Inference client for the search model; the mock matches the index width
pub fn search_client(
    index: &VectorIndex,
    mock: bool,
    config: &EngineConfig,
) -> anyhow::Result<InferenceClient> {
    let client = if mock {
        let dim = index.dimensions()?.unwrap_or(DEFAULT_MOCK_DIM);
        InferenceClient::with_backend(InferenceConfig::default(), move || MockBackend::new(dim))
    } else {
        let models_dir = config.models_dir();
        InferenceClient::with_backend(InferenceConfig::default(), move || {
            OnnxBackend::from_models_dir(&models_dir)
        })
    };
    Ok(client)
}

/// Bulk transfer service backed by the on-disk stores
pub fn transfer_service(
    config: &EngineConfig,
    transfer: TransferConfig,
) -> anyhow::Result<BulkTransferService> {
    let db_path = config.database_path();
    let service = BulkTransferService::new(
        transfer,
        Arc::new(VectorIndex::open(&db_path, Corpus::Legislation)?),
        Arc::new(VectorIndex::open(&db_path, Corpus::CaseLaw)?),
        Arc::new(SqliteDocumentStore::open(&db_path)?),
    )?
    .with_preferences(config.preferences_path());
    Ok(service)
}
