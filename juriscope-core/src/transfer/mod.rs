//! CDN-backed bulk transfer of corpus snapshots
//!
//! Precomputed embeddings and raw source documents are fetched from a proxy
//! in front of the CDN, validated, and persisted in batches.

pub mod download;
pub mod import;
pub mod service;
pub mod status;

pub use download::{estimated_size, Downloader, ProgressTracker};
pub use import::{parse_embeddings, parse_source_documents};
pub use service::{BulkTransferService, TransferOutcome};
pub use status::{DownloadKind, DownloadStatus};

use crate::storage::StorageError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned HTTP {0}")]
    Status(u16),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Nothing to import")]
    EmptyPayload,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Preferences error: {0}")]
    Preferences(#[from] crate::preferences::PreferencesError),
}

pub type Result<T> = std::result::Result<T, TransferError>;

/// Configuration for bulk transfers
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Proxy endpoint; files are requested as `<proxy_url>?file=<name>`
    pub proxy_url: String,
    /// Total attempts per file, including the first
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further attempt
    pub backoff_base: Duration,
    /// Chunks persisted per transaction
    pub embeddings_batch_size: usize,
    /// Source documents persisted per transaction
    pub data_batch_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            proxy_url: "https://cdn.juriscope.app/api/proxy".to_string(),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            embeddings_batch_size: 100,
            data_batch_size: 250,
        }
    }
}

impl TransferConfig {
    pub fn new(proxy_url: impl Into<String>) -> Self {
        Self {
            proxy_url: proxy_url.into(),
            ..Self::default()
        }
    }
}
