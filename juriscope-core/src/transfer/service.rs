//! Bulk transfer orchestration
//!
//! Downloads a snapshot, validates it and persists it batch by batch, while
//! keeping one status record per corpus and download kind.

use super::download::Downloader;
use super::import::{parse_embeddings, parse_source_documents};
use super::status::{DownloadKind, DownloadStatus, StatusBoard};
use super::{Result, TransferConfig, TransferError};
use crate::corpus::Corpus;
use crate::preferences::Preferences;
use crate::storage::{ChunkStore, DocumentStore};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Result of a download request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Records persisted
    Imported(usize),
    /// A download for the same corpus and kind is running or already completed
    Skipped,
}

pub struct BulkTransferService {
    config: TransferConfig,
    downloader: Downloader,
    legislation: Arc<dyn ChunkStore>,
    case_law: Arc<dyn ChunkStore>,
    documents: Arc<dyn DocumentStore>,
    board: Mutex<StatusBoard>,
    preferences: Mutex<Preferences>,
    preferences_path: Option<PathBuf>,
}

impl BulkTransferService {
    pub fn new(
        config: TransferConfig,
        legislation: Arc<dyn ChunkStore>,
        case_law: Arc<dyn ChunkStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> Result<Self> {
        Ok(Self {
            downloader: Downloader::new(&config)?,
            config,
            legislation,
            case_law,
            documents,
            board: Mutex::new(StatusBoard::default()),
            preferences: Mutex::new(Preferences::default()),
            preferences_path: None,
        })
    }

    /// Persist prompt dismissals to a preferences file, loading its current state
    pub fn with_preferences(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.preferences = Mutex::new(Preferences::load(&path));
        self.preferences_path = Some(path);
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    fn chunk_store(&self, corpus: Corpus) -> &dyn ChunkStore {
        match corpus {
            Corpus::Legislation => self.legislation.as_ref(),
            Corpus::CaseLaw => self.case_law.as_ref(),
        }
    }

    fn board(&self) -> MutexGuard<'_, StatusBoard> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prefs(&self) -> MutexGuard<'_, Preferences> {
        self.preferences.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the corpus has no embedded chunks yet. Read errors count as empty.
    pub fn needs_download(&self, corpus: Corpus) -> bool {
        match self.chunk_store(corpus).count() {
            Ok(count) => count == 0,
            Err(e) => {
                warn!(%corpus, error = %e, "cannot count chunks, assuming download needed");
                true
            }
        }
    }

    /// Whether the corpus has no source documents yet. Read errors count as empty.
    pub fn needs_data_download(&self, corpus: Corpus) -> bool {
        match self.documents.count(corpus) {
            Ok(count) => count == 0,
            Err(e) => {
                warn!(%corpus, error = %e, "cannot count documents, assuming download needed");
                true
            }
        }
    }

    /// Startup check: resolve `needed` on both status records of a corpus
    pub fn resolve_needed(&self, corpus: Corpus) {
        let embeddings = self.needs_download(corpus);
        let data = self.needs_data_download(corpus);

        let mut board = self.board();
        board.entry(corpus, DownloadKind::Embeddings).needed = Some(embeddings);
        board.entry(corpus, DownloadKind::SourceData).needed = Some(data);
        debug!(%corpus, embeddings, data, "resolved download need");
    }

    pub fn status(&self, corpus: Corpus, kind: DownloadKind) -> DownloadStatus {
        self.board().get(corpus, kind)
    }

    pub fn preferences(&self) -> Preferences {
        self.prefs().clone()
    }

    /// Whether to offer the download to the user
    pub fn should_prompt(&self, corpus: Corpus, kind: DownloadKind) -> bool {
        let status = self.status(corpus, kind);
        status.needed == Some(true) && status.is_idle() && !self.prefs().prompt_dismissed(corpus)
    }

    /// Record that the user declined the download prompt
    pub fn dismiss_prompt(&self, corpus: Corpus) -> Result<()> {
        let mut prefs = self.prefs();
        prefs.set_prompt_dismissed(corpus, true);
        if let Some(path) = &self.preferences_path {
            prefs.save(path)?;
        }
        Ok(())
    }

    /// Download and import the corpus' precomputed embeddings.
    ///
    /// `on_progress` follows the network transfer; `on_batch` receives
    /// `(persisted, total)` after every batch.
    pub async fn download_embeddings<P, B>(
        &self,
        corpus: Corpus,
        on_progress: P,
        on_batch: B,
    ) -> Result<TransferOutcome>
    where
        P: FnMut(f64) + Send,
        B: FnMut(usize, usize),
    {
        let kind = DownloadKind::Embeddings;
        if !self.begin(corpus, kind) {
            return Ok(TransferOutcome::Skipped);
        }

        let result = async {
            let payload = self.fetch(corpus, kind, on_progress).await?;
            self.import_embeddings(corpus, &payload, on_batch).await
        }
        .await;

        self.finish(corpus, kind, &result);
        result.map(TransferOutcome::Imported)
    }

    /// Download and import the corpus' raw source documents
    pub async fn download_source_data<P, B>(
        &self,
        corpus: Corpus,
        on_progress: P,
        on_batch: B,
    ) -> Result<TransferOutcome>
    where
        P: FnMut(f64) + Send,
        B: FnMut(usize, usize),
    {
        let kind = DownloadKind::SourceData;
        if !self.begin(corpus, kind) {
            return Ok(TransferOutcome::Skipped);
        }

        let result = async {
            let payload = self.fetch(corpus, kind, on_progress).await?;
            self.import_source_data(corpus, &payload, on_batch).await
        }
        .await;

        self.finish(corpus, kind, &result);
        result.map(TransferOutcome::Imported)
    }

    /// Validate an embeddings snapshot and persist it in batches
    pub async fn import_embeddings<B>(
        &self,
        corpus: Corpus,
        payload: &str,
        mut on_batch: B,
    ) -> Result<usize>
    where
        B: FnMut(usize, usize),
    {
        let chunks = parse_embeddings(payload, corpus)?;
        let store = self.chunk_store(corpus);

        let incoming = chunks[0].embedding.len();
        if let Some(stored) = store.dimensions()? {
            if stored != incoming {
                return Err(TransferError::InvalidFormat(format!(
                    "embeddings have {incoming} dimensions, {corpus} index holds {stored}"
                )));
            }
        }

        let existing = store.all_ids()?;
        let new = chunks.iter().filter(|c| !existing.contains(&c.id)).count();
        debug!(%corpus, total = chunks.len(), new, "importing embeddings");

        let total = chunks.len();
        let mut done = 0;
        for batch in chunks.chunks(self.config.embeddings_batch_size.max(1)) {
            store.put_batch(batch)?;
            done += batch.len();
            on_batch(done, total);
            tokio::task::yield_now().await;
        }

        info!(%corpus, total, "embeddings imported");
        Ok(total)
    }

    /// Validate a source-data snapshot and persist it in batches
    pub async fn import_source_data<B>(
        &self,
        corpus: Corpus,
        payload: &str,
        mut on_batch: B,
    ) -> Result<usize>
    where
        B: FnMut(usize, usize),
    {
        let documents = parse_source_documents(payload, corpus)?;

        let total = documents.len();
        let mut done = 0;
        for batch in documents.chunks(self.config.data_batch_size.max(1)) {
            self.documents.put_batch(corpus, batch)?;
            done += batch.len();
            on_batch(done, total);
            tokio::task::yield_now().await;
        }

        info!(%corpus, total, "source documents imported");
        Ok(total)
    }

    async fn fetch<P>(&self, corpus: Corpus, kind: DownloadKind, mut on_progress: P) -> Result<String>
    where
        P: FnMut(f64) + Send,
    {
        let file_name = kind.file_name(corpus);
        info!(%corpus, file = file_name, "downloading");
        self.downloader
            .download_file(file_name, |progress| {
                self.board().entry(corpus, kind).progress = progress;
                on_progress(progress);
            })
            .await
    }

    /// Take the download lock; false when the download is running or done
    fn begin(&self, corpus: Corpus, kind: DownloadKind) -> bool {
        let mut board = self.board();
        let status = board.entry(corpus, kind);
        if !status.is_idle() {
            debug!(%corpus, %kind, "download already running or completed");
            return false;
        }
        status.start();
        true
    }

    fn finish(&self, corpus: Corpus, kind: DownloadKind, result: &Result<usize>) {
        let mut board = self.board();
        let status = board.entry(corpus, kind);
        match result {
            Ok(_) => status.succeed(),
            Err(e) => {
                warn!(%corpus, %kind, error = %e, "download failed");
                status.fail(e.to_string());
            }
        }
    }
}
