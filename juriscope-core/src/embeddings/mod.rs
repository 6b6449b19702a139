//! Embeddings module for semantic search
//!
//! Provides text chunking and the model backends hosted by the inference
//! worker (ONNX-based, plus a deterministic mock).

pub mod chunker;
pub mod model;
pub mod onnx;

pub use chunker::{ChunkKind, ChunkerConfig, TextChunk, TextChunker};
pub use model::{InferenceBackend, MockBackend};
pub use onnx::{OnnxBackend, OnnxModelConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("ONNX runtime error: {0}")]
    Ort(String),

    #[error("Model not loaded: {0}")]
    NotLoaded(&'static str),
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;
