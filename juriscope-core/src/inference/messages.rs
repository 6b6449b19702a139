//! Messages crossing the worker boundary
//!
//! Every request carries a correlation id; the worker answers with a
//! `Result` or `Error` event echoing it. `Progress`, `Ready` and `Fatal` are
//! unsolicited.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One of the two models hosted by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Token-classification model for entity recognition
    Ner,
    /// Sentence-embedding model for semantic search
    Search,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Ner, ModelKind::Search];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Ner => "ner",
            ModelKind::Search => "search",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How token states are reduced to a sentence embedding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    #[default]
    Mean,
    Cls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedOptions {
    pub pooling: Pooling,
    pub normalize: bool,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            pooling: Pooling::Mean,
            normalize: true,
        }
    }
}

/// A raw token as reported by the entity recognizer.
///
/// `start`/`end` are whatever the model reported and are not trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NerToken {
    pub word: String,
    /// Tag such as `B-ORG`, `I-PER` or `O`
    pub entity: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

/// Request sent to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: Uuid,
    #[serde(flatten)]
    pub call: WorkerCall,
}

/// The operation requested, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerCall {
    InitNer,
    InitSearch,
    Ner { text: String },
    Embedding { text: String, options: EmbedOptions },
    Unload { model: ModelKind },
}

impl WorkerCall {
    /// Wire name of the call, used in logs and timeout errors
    pub fn name(&self) -> &'static str {
        match self {
            WorkerCall::InitNer => "init-ner",
            WorkerCall::InitSearch => "init-search",
            WorkerCall::Ner { .. } => "ner",
            WorkerCall::Embedding { .. } => "embedding",
            WorkerCall::Unload { .. } => "unload",
        }
    }

    pub fn init(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Ner => WorkerCall::InitNer,
            ModelKind::Search => WorkerCall::InitSearch,
        }
    }
}

/// Successful payload of a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum WorkerOutput {
    Loaded,
    Unloaded,
    Entities(Vec<NerToken>),
    Embedding(Vec<f32>),
}

/// Event sent back by the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerEvent {
    /// Load progress of a model (0-100)
    Progress { model: ModelKind, progress: u8 },
    /// The worker is up; informational only
    Ready,
    /// A single request failed
    Error { id: Uuid, error: String },
    /// A single request succeeded
    Result { id: Uuid, result: WorkerOutput },
    /// The worker itself failed and is going away
    Fatal { error: String },
}
