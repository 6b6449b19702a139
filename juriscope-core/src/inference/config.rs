//! Inference client configuration

use std::time::Duration;

/// Timeouts and policies for the inference client
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Budget for loading the entity recognizer
    pub ner_init_timeout: Duration,
    /// Budget for loading the embedding model (first load may download weights)
    pub search_init_timeout: Duration,
    /// Budget for a single inference call
    pub call_timeout: Duration,
    /// Budget for an unload call
    pub unload_timeout: Duration,
    /// Free the entity recognizer after every extraction
    pub unload_ner_after_use: bool,
    /// Characters per entity-extraction window
    pub ner_window_chars: usize,
    /// Characters shared by consecutive windows
    pub ner_window_overlap: usize,
    pub query_prefix: String,
    pub passage_prefix: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            ner_init_timeout: Duration::from_secs(120),
            search_init_timeout: Duration::from_secs(600),
            call_timeout: Duration::from_secs(60),
            unload_timeout: Duration::from_secs(10),
            unload_ner_after_use: true,
            ner_window_chars: 1000,
            ner_window_overlap: 100,
            query_prefix: "query: ".to_string(),
            passage_prefix: "passage: ".to_string(),
        }
    }
}

impl InferenceConfig {
    /// Same timeout for every call
    pub fn with_timeouts(timeout: Duration) -> Self {
        Self {
            ner_init_timeout: timeout,
            search_init_timeout: timeout,
            call_timeout: timeout,
            unload_timeout: timeout,
            ..Self::default()
        }
    }

    pub fn init_timeout(&self, kind: super::ModelKind) -> Duration {
        match kind {
            super::ModelKind::Ner => self.ner_init_timeout,
            super::ModelKind::Search => self.search_init_timeout,
        }
    }
}
