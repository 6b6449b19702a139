//! Entity extraction passes around the recognizer
//!
//! Input text is whitespace-normalized and cut into overlapping windows.
//! Offsets reported by the model are discarded: every token is located
//! again inside its window by a case-insensitive search that advances a
//! cursor, so repeated words resolve to successive occurrences. The located
//! tokens are then deduplicated, merged into entities and post-processed.
//!
//! All positions are char offsets into the normalized text.

use super::messages::NerToken;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Width of the position bucket used when deduplicating tokens
const POSITION_BUCKET: usize = 50;

/// Longest ORG/LOC tail that may be bridged onto a preceding ORG
const MAX_BRIDGED_CHARS: usize = 40;

const BRIDGE_WORDS: [&str; 5] = ["de", "do", "da", "dos", "das"];

/// A recognized entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    /// Surface text as it appears in the normalized input
    pub text: String,
    /// Entity type without the B-/I- prefix (ORG, PER, LOC, ...)
    pub label: String,
    pub start: usize,
    pub end: usize,
    /// Mean score of the merged tokens
    pub score: f32,
}

/// A slice of the normalized text sent to the recognizer
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Window {
    /// Char offset of the window in the normalized text
    pub start: usize,
    pub text: String,
}

/// A token placed back into the normalized text
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LocatedToken {
    /// Token text without the `##` continuation marker
    pub word: String,
    /// Entity type, `None` for non-entity tokens
    pub label: Option<String>,
    /// Whether the token continues the previous word
    pub subword: bool,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// Collapse every whitespace run to a single space and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split into fixed-size overlapping windows (sizes in chars)
pub(crate) fn split_windows(text: &str, size: usize, overlap: usize) -> Vec<Window> {
    let chars: Vec<char> = text.chars().collect();
    let size = size.max(1);
    let step = size.saturating_sub(overlap).max(1);

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        windows.push(Window {
            start,
            text: chars[start..end].iter().collect(),
        });
        if end >= chars.len() {
            break;
        }
        start += step;
    }
    windows
}

fn uppercase_run() -> &'static Regex {
    static RUN: OnceLock<Regex> = OnceLock::new();
    RUN.get_or_init(|| {
        Regex::new(r"\b\p{Lu}{2,}\b(?:\s+\b\p{Lu}{2,}\b)+").expect("uppercase run pattern is valid")
    })
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Title-case runs of two or more all-caps words.
///
/// The char count is preserved so positions found in the result are valid
/// in the input.
pub(crate) fn title_case_runs(text: &str) -> String {
    uppercase_run()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let mut word_start = true;
            caps[0]
                .chars()
                .map(|c| {
                    if c.is_whitespace() {
                        word_start = true;
                        c
                    } else if word_start {
                        word_start = false;
                        c
                    } else {
                        fold(c)
                    }
                })
                .collect::<String>()
        })
        .into_owned()
}

fn entity_type(tag: &str) -> Option<String> {
    if tag.is_empty() || tag == "O" {
        return None;
    }
    let label = tag
        .strip_prefix("B-")
        .or_else(|| tag.strip_prefix("I-"))
        .unwrap_or(tag);
    Some(label.to_string())
}

fn find_folded(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

/// Locate raw tokens inside the window they were recognized in
pub(crate) fn locate_tokens(window: &Window, tokens: Vec<NerToken>) -> Vec<LocatedToken> {
    let haystack: Vec<char> = window.text.chars().map(fold).collect();
    let mut cursor = 0;
    let mut located = Vec::with_capacity(tokens.len());

    for token in tokens {
        let subword = token.word.starts_with("##");
        let word = token.word.trim_start_matches("##");
        let needle: Vec<char> = word.chars().map(fold).collect();

        let Some(pos) = find_folded(&haystack, &needle, cursor) else {
            tracing::trace!(word, "token not found in window");
            continue;
        };
        cursor = pos + needle.len();

        located.push(LocatedToken {
            word: word.to_string(),
            label: entity_type(&token.entity),
            subword,
            start: window.start + pos,
            end: window.start + cursor,
            score: token.score,
        });
    }

    located
}

/// Drop tokens repeated by overlapping windows
pub(crate) fn dedupe_tokens(tokens: Vec<LocatedToken>) -> Vec<LocatedToken> {
    let mut seen = HashSet::new();
    tokens
        .into_iter()
        .filter(|t| {
            seen.insert((
                t.word.to_lowercase(),
                t.label.clone(),
                t.start / POSITION_BUCKET,
            ))
        })
        .collect()
}

struct Span {
    label: String,
    start: usize,
    end: usize,
    score_sum: f32,
    count: usize,
}

impl Span {
    fn new(label: String, start: usize, end: usize, score: f32) -> Self {
        Self {
            label,
            start,
            end,
            score_sum: score,
            count: 1,
        }
    }

    fn into_entity(self, chars: &[char]) -> Entity {
        let end = self.end.min(chars.len());
        let start = self.start.min(end);
        Entity {
            text: chars[start..end].iter().collect(),
            label: self.label,
            start,
            end,
            score: self.score_sum / self.count as f32,
        }
    }
}

/// Merge sorted tokens into contiguous entities.
///
/// Same-type tokens join when adjacent or one char apart. A non-entity token
/// directly followed by an adjacent subword entity token becomes that
/// entity's first fragment.
pub(crate) fn merge_tokens(tokens: &[LocatedToken], chars: &[char]) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut current: Option<Span> = None;
    let mut pending: Option<&LocatedToken> = None;

    for token in tokens {
        let Some(label) = &token.label else {
            if let Some(span) = current.take() {
                entities.push(span.into_entity(chars));
            }
            pending = Some(token);
            continue;
        };

        if let Some(prefix) = pending.take() {
            if token.subword && prefix.end == token.start {
                if let Some(span) = current.take() {
                    entities.push(span.into_entity(chars));
                }
                current = Some(Span::new(label.clone(), prefix.start, token.end, token.score));
                continue;
            }
        }

        match current.as_mut() {
            Some(span) if span.label == *label && token.start <= span.end + 1 => {
                span.end = span.end.max(token.end);
                span.score_sum += token.score;
                span.count += 1;
            }
            _ => {
                if let Some(span) = current.take() {
                    entities.push(span.into_entity(chars));
                }
                current = Some(Span::new(label.clone(), token.start, token.end, token.score));
            }
        }
    }

    if let Some(span) = current {
        entities.push(span.into_entity(chars));
    }
    entities
}

fn is_org(label: &str) -> bool {
    matches!(label, "ORG" | "ORGANIZACAO")
}

fn is_org_or_loc(label: &str) -> bool {
    is_org(label) || matches!(label, "LOC" | "LOCAL")
}

/// Join composite institution names: ORG + de/do/da/dos/das + short ORG/LOC
pub(crate) fn bridge_institutions(entities: Vec<Entity>, chars: &[char]) -> Vec<Entity> {
    let mut out: Vec<Entity> = Vec::with_capacity(entities.len());
    let mut iter = entities.into_iter().peekable();

    while let Some(mut entity) = iter.next() {
        while is_org(&entity.label) {
            let Some(next) = iter.peek() else { break };
            if !is_org_or_loc(&next.label)
                || next.end - next.start > MAX_BRIDGED_CHARS
                || next.start < entity.end
            {
                break;
            }
            let between: String = chars[entity.end..next.start].iter().collect();
            if between.contains('\n') || !BRIDGE_WORDS.contains(&between.trim().to_lowercase().as_str())
            {
                break;
            }
            let Some(next) = iter.next() else { break };
            entity.end = next.end;
            entity.text = chars[entity.start..entity.end].iter().collect();
            entity.score = (entity.score + next.score) / 2.0;
        }
        out.push(entity);
    }

    out
}

/// Run every pass after recognition over the concatenated window hits
pub(crate) fn assemble(text: &str, tokens: Vec<LocatedToken>) -> Vec<Entity> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = dedupe_tokens(tokens);
    tokens.sort_by_key(|t| (t.start, t.end));
    let merged = merge_tokens(&tokens, &chars);
    bridge_institutions(merged, &chars)
}
