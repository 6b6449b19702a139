//! Lexical near-duplicate detection for the content library

pub mod tfidf;
pub mod tokenizer;

pub use tfidf::{LexicalSimilarityIndex, LibraryDocument, SimilarityConfig, SimilarityMatch};
pub use tokenizer::tokenize;
