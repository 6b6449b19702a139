//! Vector math shared by every search path
//!
//! Cosine similarity plus the filter -> dedupe-by-group -> sort -> truncate
//! ranking policy used by both corpus indexes.

use std::collections::HashMap;
use std::hash::Hash;

/// An item paired with its similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<T> {
    pub item: T,
    pub score: f32,
}

/// Cosine similarity between two vectors.
///
/// Never panics on malformed input: empty or length-mismatched vectors
/// score 0, and so does a vector with zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Score, filter, dedupe and rank a set of items.
///
/// Items scoring below `threshold` are dropped. Of the remaining items only
/// the best-scoring member of each group survives; on equal scores the
/// member seen first is kept. Output is sorted by descending score and
/// truncated to `limit`.
pub fn rank_and_dedupe<T, K, S, G>(
    items: impl IntoIterator<Item = T>,
    mut score_fn: S,
    mut group_key: G,
    threshold: f32,
    limit: usize,
) -> Vec<Scored<T>>
where
    K: Eq + Hash,
    S: FnMut(&T) -> f32,
    G: FnMut(&T) -> K,
{
    let mut best: Vec<Scored<T>> = Vec::new();
    let mut slots: HashMap<K, usize> = HashMap::new();

    for item in items {
        let score = score_fn(&item);
        if score.is_nan() || score < threshold {
            continue;
        }

        let key = group_key(&item);
        match slots.get(&key) {
            Some(&slot) => {
                if score > best[slot].score {
                    best[slot] = Scored { item, score };
                }
            }
            None => {
                slots.insert(key, best.len());
                best.push(Scored { item, score });
            }
        }
    }

    // Stable sort keeps first-seen order among equal scores
    best.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    best.truncate(limit);
    best
}
