//! TF-IDF near-duplicate detection over the content library

use super::tokenizer::tokenize;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Configuration for the lexical similarity index
#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    /// Minimum similarity reported as a near-duplicate
    pub threshold: f32,
    /// Terms present in this share of documents or more are dropped
    pub max_df_ratio: f32,
    /// Terms present in fewer documents than this are dropped
    pub min_df: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.80,
            max_df_ratio: 0.90,
            min_df: 2,
        }
    }
}

/// A document of the content library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryDocument {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Body text. Any non-string value is read as empty.
    #[serde(default, deserialize_with = "lenient_text")]
    pub content: String,
}

impl LibraryDocument {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
        }
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        _ => String::new(),
    })
}

/// Best near-duplicate found for a candidate
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatch<'a> {
    pub document: &'a LibraryDocument,
    pub similarity: f32,
}

/// Sparse vector as (term index, weight), sorted by term index
type SparseVector = Vec<(usize, f32)>;

fn dot(a: &SparseVector, b: &SparseVector) -> f32 {
    let (mut i, mut j, mut sum) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

/// Cached TF-IDF index over the library.
///
/// The owner must call [`invalidate`](Self::invalidate) on every create,
/// update or delete; a change in document count also forces a rebuild.
#[derive(Debug, Default)]
pub struct LexicalSimilarityIndex {
    config: SimilarityConfig,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    vectors: Vec<(String, SparseVector)>,
    valid: bool,
}

impl LexicalSimilarityIndex {
    pub fn new(config: SimilarityConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Compute vocabulary, idf weights and one cached vector per document
    pub fn build_index(&mut self, documents: &[LibraryDocument]) {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(&d.content)).collect();
        let total = documents.len() as f32;

        let mut df: HashMap<&str, usize> = HashMap::new();
        for terms in &tokenized {
            let unique: HashSet<&str> = terms.iter().map(String::as_str).collect();
            for term in unique {
                *df.entry(term).or_default() += 1;
            }
        }

        let mut retained: Vec<(&str, usize)> = df
            .into_iter()
            .filter(|&(_, count)| {
                count >= self.config.min_df && (count as f32 / total) < self.config.max_df_ratio
            })
            .collect();
        retained.sort_unstable_by(|a, b| a.0.cmp(b.0));

        self.vocabulary = retained
            .iter()
            .enumerate()
            .map(|(index, (term, _))| (term.to_string(), index))
            .collect();
        self.idf = retained
            .iter()
            .map(|&(_, count)| (total / count as f32).ln() + 1.0)
            .collect();

        self.vectors = documents
            .iter()
            .zip(&tokenized)
            .map(|(doc, terms)| (doc.id.clone(), self.vectorize(terms)))
            .collect();
        self.valid = true;

        debug!(
            documents = documents.len(),
            vocabulary = self.vocabulary.len(),
            "lexical index rebuilt"
        );
    }

    fn vectorize(&self, terms: &[String]) -> SparseVector {
        let mut tf: HashMap<usize, u32> = HashMap::new();
        for term in terms {
            if let Some(&index) = self.vocabulary.get(term) {
                *tf.entry(index).or_default() += 1;
            }
        }

        let mut vector: SparseVector = tf
            .into_iter()
            .map(|(index, count)| (index, (1.0 + (count as f32).ln()) * self.idf[index]))
            .collect();
        vector.sort_unstable_by_key(|&(index, _)| index);

        let norm = vector.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|(_, w)| *w /= norm);
        }
        vector
    }

    /// Project a text into the current vocabulary
    pub fn compute_vector(&self, text: &str) -> Vec<(usize, f32)> {
        self.vectorize(&tokenize(text))
    }

    /// Best match at or above the configured threshold
    pub fn find_similar<'a>(
        &mut self,
        candidate: &LibraryDocument,
        documents: &'a [LibraryDocument],
    ) -> Option<SimilarityMatch<'a>> {
        let threshold = self.config.threshold;
        self.find_similar_above(candidate, documents, threshold)
    }

    /// Best match at or above `threshold`, ignoring the candidate's own entry
    pub fn find_similar_above<'a>(
        &mut self,
        candidate: &LibraryDocument,
        documents: &'a [LibraryDocument],
        threshold: f32,
    ) -> Option<SimilarityMatch<'a>> {
        if !self.valid || self.vectors.len() != documents.len() {
            self.build_index(documents);
        }

        let query = self.compute_vector(&candidate.content);
        let mut best: Option<(&str, f32)> = None;

        for (id, vector) in &self.vectors {
            if *id == candidate.id {
                continue;
            }
            let similarity = dot(&query, vector);
            if similarity >= threshold && best.map_or(true, |(_, b)| similarity > b) {
                best = Some((id.as_str(), similarity));
            }
        }

        let (id, similarity) = best?;
        documents
            .iter()
            .find(|doc| doc.id == id)
            .map(|document| SimilarityMatch {
                document,
                similarity,
            })
    }

    /// Drop the cache; the next lookup rebuilds it
    pub fn invalidate(&mut self) {
        self.vocabulary.clear();
        self.idf.clear();
        self.vectors.clear();
        self.valid = false;
    }
}
