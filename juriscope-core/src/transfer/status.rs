//! Per-corpus download state

use crate::corpus::Corpus;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// What a transfer populates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadKind {
    /// Precomputed chunk embeddings, stored in the corpus' vector index
    Embeddings,
    /// Raw statutes or precedents, stored in the document store
    SourceData,
}

impl DownloadKind {
    pub const ALL: [DownloadKind; 2] = [DownloadKind::Embeddings, DownloadKind::SourceData];

    pub fn file_name(&self, corpus: Corpus) -> &'static str {
        match self {
            DownloadKind::Embeddings => corpus.embeddings_file(),
            DownloadKind::SourceData => corpus.data_file(),
        }
    }
}

impl fmt::Display for DownloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DownloadKind::Embeddings => "embeddings",
            DownloadKind::SourceData => "source-data",
        })
    }
}

/// Status record of one download.
///
/// `needed` is `None` until the startup check has run. A failed download
/// keeps `needed` and records the error so it can be retried.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DownloadStatus {
    pub needed: Option<bool>,
    pub downloading: bool,
    pub progress: f64,
    pub error: Option<String>,
    pub completed: bool,
}

impl DownloadStatus {
    /// Whether a new download may start
    pub fn is_idle(&self) -> bool {
        !self.downloading && !self.completed
    }

    pub(crate) fn start(&mut self) {
        self.downloading = true;
        self.progress = 0.0;
        self.error = None;
    }

    pub(crate) fn succeed(&mut self) {
        self.downloading = false;
        self.completed = true;
        self.needed = Some(false);
        self.progress = 1.0;
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.downloading = false;
        self.error = Some(error);
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatusBoard {
    records: HashMap<(Corpus, DownloadKind), DownloadStatus>,
}

impl StatusBoard {
    pub fn get(&self, corpus: Corpus, kind: DownloadKind) -> DownloadStatus {
        self.records
            .get(&(corpus, kind))
            .cloned()
            .unwrap_or_default()
    }

    pub fn entry(&mut self, corpus: Corpus, kind: DownloadKind) -> &mut DownloadStatus {
        self.records.entry((corpus, kind)).or_default()
    }
}
