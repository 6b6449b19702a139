pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod indexing;
pub mod inference;
pub mod lexical;
pub mod preferences;
pub mod similarity;
pub mod storage;
pub mod transfer;

pub use config::EngineConfig;
pub use corpus::Corpus;
pub use indexing::DocumentIndexer;
pub use inference::{InferenceClient, InferenceConfig, InferenceError};
pub use lexical::LexicalSimilarityIndex;
pub use preferences::Preferences;
pub use storage::{SqliteDocumentStore, VectorIndex};
pub use transfer::{BulkTransferService, TransferConfig};
