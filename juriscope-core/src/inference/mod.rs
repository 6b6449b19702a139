//! Worker-hosted neural inference
//!
//! The entity recognizer and the embedding model live behind a message
//! boundary: [`InferenceClient`] talks to a worker (by default a dedicated
//! thread, see [`worker`]) using the typed messages in [`messages`].

pub mod client;
pub mod config;
pub mod entities;
pub mod messages;
pub mod status;
pub mod worker;

pub use client::{EmbeddingPurpose, InferenceClient, Subscription, WorkerSpawner};
pub use config::InferenceConfig;
pub use entities::Entity;
pub use messages::{
    EmbedOptions, ModelKind, NerToken, Pooling, WorkerCall, WorkerEvent, WorkerOutput,
    WorkerRequest,
};
pub use status::{LoadStatus, ModelState, ModelStatus, StatusListener};
pub use worker::{run_worker, spawn_thread_worker, WorkerChannel, WorkerEndpoint};

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("{call} call timed out after {after:?}")]
    Timeout { call: &'static str, after: Duration },

    #[error("Inference worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("Inference worker error: {0}")]
    Worker(String),

    #[error("Model not ready: {0}")]
    NotReady(ModelKind),

    #[error("Model is already loading: {0}")]
    AlreadyLoading(ModelKind),

    #[error("Inference worker disconnected")]
    Disconnected,

    #[error("Failed to start inference worker: {0}")]
    Spawn(String),

    #[error("Unexpected worker response: {0}")]
    UnexpectedResponse(String),
}

pub type Result<T> = std::result::Result<T, InferenceError>;
