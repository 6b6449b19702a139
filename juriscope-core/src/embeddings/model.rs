//! Model backend abstraction hosted by the inference worker
//!
//! The worker thread owns exactly one backend and drives it one request at a
//! time, so implementations get `&mut self` and need not be `Sync`.

use super::{EmbeddingError, Result};
use crate::inference::{ModelKind, NerToken, Pooling};
use crate::similarity::l2_normalize;
use std::collections::HashSet;

/// The two models behind the worker boundary (allows mocking)
pub trait InferenceBackend: Send {
    /// Load a model, reporting progress (0-100) as it goes
    fn load(&mut self, kind: ModelKind, progress: &mut dyn FnMut(u8)) -> Result<()>;

    /// Free a model's memory. Unloading a model that is not loaded is a no-op.
    fn unload(&mut self, kind: ModelKind);

    fn is_loaded(&self, kind: ModelKind) -> bool;

    /// Run token classification over a text
    fn recognize(&mut self, text: &str) -> Result<Vec<NerToken>>;

    /// Generate a sentence embedding
    fn embed(&mut self, text: &str, pooling: Pooling) -> Result<Vec<f32>>;
}

/// Mock backend for testing (deterministic embeddings, scripted entities)
#[derive(Clone)]
pub struct MockBackend {
    dim: usize,
    entities: Vec<(String, String)>,
    panic_marker: Option<String>,
    fail_load: bool,
    loaded: HashSet<ModelKind>,
}

impl MockBackend {
    pub fn new(dim: usize) -> Self {
        Self {
            dim: dim.max(1),
            entities: Vec::new(),
            panic_marker: None,
            fail_load: false,
            loaded: HashSet::new(),
        }
    }

    /// Recognize every occurrence of `phrase` as an entity of type `label`
    pub fn with_entity(mut self, phrase: &str, label: &str) -> Self {
        self.entities.push((phrase.to_string(), label.to_string()));
        self
    }

    /// Panic when asked to process a text containing `marker`
    pub fn panic_on(mut self, marker: &str) -> Self {
        self.panic_marker = Some(marker.to_string());
        self
    }

    /// Make every model load fail
    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn embedding_dim(&self) -> usize {
        self.dim
    }

    /// Generate a deterministic embedding from the words of a text.
    ///
    /// Words are hashed into buckets, so texts sharing vocabulary get similar
    /// vectors. Texts without words fall back to a hash of the raw bytes.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dim];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = Self::hash(&word.to_lowercase());
            let bucket = (hash % self.dim as u64) as usize;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        if embedding.iter().all(|&x| x == 0.0) {
            let hash = Self::hash(text);
            embedding = (0..self.dim)
                .map(|i| ((hash.wrapping_mul(i as u64 + 1)) % 1000) as f32 / 1000.0 - 0.5)
                .collect();
        }

        l2_normalize(&mut embedding);
        embedding
    }

    fn hash(text: &str) -> u64 {
        text.bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
    }

    fn check_panic(&self, text: &str) {
        if let Some(marker) = &self.panic_marker {
            if text.contains(marker.as_str()) {
                panic!("mock backend crashed on {marker:?}");
            }
        }
    }

    fn require(&self, kind: ModelKind) -> Result<()> {
        if self.loaded.contains(&kind) {
            Ok(())
        } else {
            Err(EmbeddingError::NotLoaded(kind.as_str()))
        }
    }
}

impl InferenceBackend for MockBackend {
    fn load(&mut self, kind: ModelKind, progress: &mut dyn FnMut(u8)) -> Result<()> {
        if self.fail_load {
            return Err(EmbeddingError::Model(format!("cannot load {kind} model")));
        }
        for step in [0, 50, 100] {
            progress(step);
        }
        self.loaded.insert(kind);
        Ok(())
    }

    fn unload(&mut self, kind: ModelKind) {
        self.loaded.remove(&kind);
    }

    fn is_loaded(&self, kind: ModelKind) -> bool {
        self.loaded.contains(&kind)
    }

    fn recognize(&mut self, text: &str) -> Result<Vec<NerToken>> {
        self.require(ModelKind::Ner)?;
        self.check_panic(text);

        let haystack = text.to_lowercase();
        let mut hits: Vec<(usize, Vec<NerToken>)> = Vec::new();

        for (phrase, label) in &self.entities {
            let needle = phrase.to_lowercase();
            if needle.is_empty() {
                continue;
            }
            for (pos, _) in haystack.match_indices(&needle) {
                let surface = text.get(pos..pos + needle.len()).unwrap_or(phrase.as_str());
                let tokens = surface
                    .split_whitespace()
                    .enumerate()
                    .map(|(i, word)| NerToken {
                        word: word.to_string(),
                        entity: if i == 0 {
                            format!("B-{label}")
                        } else {
                            format!("I-{label}")
                        },
                        score: 0.99,
                        start: None,
                        end: None,
                    })
                    .collect();
                hits.push((pos, tokens));
            }
        }

        hits.sort_by_key(|(pos, _)| *pos);
        Ok(hits.into_iter().flat_map(|(_, tokens)| tokens).collect())
    }

    fn embed(&mut self, text: &str, _pooling: Pooling) -> Result<Vec<f32>> {
        self.require(ModelKind::Search)?;
        self.check_panic(text);
        Ok(self.embed_text(text))
    }
}
