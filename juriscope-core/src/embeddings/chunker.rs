//! Text chunking for embedding generation
//!
//! Long legal texts are split before embedding: judicial holdings are split
//! on their numbered/lettered thesis markers when they have them, everything
//! else falls back to overlapping fixed-size windows.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Configuration for the text chunker (sizes in chars)
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Texts shorter than this are embedded whole
    pub threshold_chars: usize,
    /// Size of each sliding window
    pub window_chars: usize,
    /// Overlap between consecutive windows
    pub overlap_chars: usize,
    /// A trailing remainder shorter than this is folded into the last window
    pub min_chunk_chars: usize,
    /// A thesis segment must be longer than this (after trimming) to count
    pub min_thesis_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            threshold_chars: 1500,
            window_chars: 1000,
            overlap_chars: 200,
            min_chunk_chars: 100,
            min_thesis_chars: 50,
        }
    }
}

/// How a chunk was cut from its source text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// The whole source text
    #[default]
    Whole,
    /// One thesis of a numbered holding
    Thesis,
    /// A sliding window over a long text
    Window,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Whole => "whole",
            ChunkKind::Thesis => "thesis",
            ChunkKind::Window => "window",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "whole" => Some(ChunkKind::Whole),
            "thesis" => Some(ChunkKind::Thesis),
            "window" => Some(ChunkKind::Window),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chunk of text ready for embedding
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    pub kind: ChunkKind,
    /// Index of this chunk within the source (0-based)
    pub chunk_index: usize,
    /// Total number of chunks produced for the source
    pub total_chunks: usize,
}

/// Marker opening a thesis in a judicial holding: "1)", "2.", "a)"
fn thesis_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"(?:^|\s)(\d{1,2}[\)\.]|[a-z]\))\s").expect("thesis marker pattern is valid")
    })
}

/// Chunker for splitting long texts into embeddable pieces
pub struct TextChunker {
    config: ChunkerConfig,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

impl TextChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split a text into chunks.
    ///
    /// Short texts come back as exactly one chunk equal to the input.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.chars().count() < self.config.threshold_chars {
            return vec![TextChunk {
                text: text.to_string(),
                kind: ChunkKind::Whole,
                chunk_index: 0,
                total_chunks: 1,
            }];
        }

        let theses = self.split_theses(text);
        let (pieces, kind) = if theses.len() >= 2 {
            (theses, ChunkKind::Thesis)
        } else {
            (self.split_windows(text), ChunkKind::Window)
        };

        let total_chunks = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(i, text)| TextChunk {
                text,
                kind,
                chunk_index: i,
                total_chunks,
            })
            .collect()
    }

    /// Split on thesis markers, keeping only non-trivial segments
    fn split_theses(&self, text: &str) -> Vec<String> {
        let starts: Vec<usize> = thesis_marker()
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.start()))
            .collect();

        if starts.is_empty() {
            return vec![];
        }

        let mut bounds = Vec::with_capacity(starts.len() + 2);
        bounds.push(0);
        bounds.extend(starts.iter().copied().filter(|&s| s > 0));
        bounds.push(text.len());

        bounds
            .windows(2)
            .map(|w| text[w[0]..w[1]].trim())
            .filter(|segment| segment.chars().count() > self.config.min_thesis_chars)
            .map(str::to_string)
            .collect()
    }

    /// Fixed-size sliding windows with overlap.
    ///
    /// Every window advances by at least one char, and the windows together
    /// cover the whole text.
    fn split_windows(&self, text: &str) -> Vec<String> {
        let window = self.config.window_chars.max(1);
        let overlap = self.config.overlap_chars.min(window - 1);
        let step = window - overlap;

        // byte offset of every char, plus the end of the text
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = offsets.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let mut end = (start + window).min(total);
            if total - end < self.config.min_chunk_chars {
                end = total;
            }

            chunks.push(text[offsets[start]..offsets[end]].to_string());

            if end == total {
                break;
            }
            start += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ChunkerConfig {
        ChunkerConfig {
            threshold_chars: 200,
            window_chars: 100,
            overlap_chars: 20,
            min_chunk_chars: 10,
            min_thesis_chars: 50,
        }
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = TextChunker::default();
        let text = "Art. 1º Esta lei entra em vigor na data de sua publicação.";

        let chunks = chunker.chunk(text);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].kind, ChunkKind::Whole);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].total_chunks, 1);
    }

    #[test]
    fn test_short_text_not_trimmed() {
        let chunker = TextChunker::default();
        let chunks = chunker.chunk("  padded  ");
        assert_eq!(chunks[0].text, "  padded  ");
    }

    #[test]
    fn test_long_text_uses_windows() {
        let chunker = TextChunker::new(small_config());
        let text = "O contribuinte deve recolher o tributo no prazo legal. ".repeat(10);

        let chunks = chunker.chunk(&text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Window));
        // a short tail is folded into the last window
        assert!(chunks.iter().all(|c| c.text.chars().count() < 100 + 10));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.total_chunks, chunks.len());
        }
    }

    #[test]
    fn test_windows_overlap() {
        let chunker = TextChunker::new(small_config());
        let text: String = (0..300).map(|i| char::from(b'a' + (i % 26) as u8)).collect();

        let chunks = chunker.chunk(&text);

        assert!(chunks.len() >= 2);
        let tail = &chunks[0].text[chunks[0].text.len() - 20..];
        assert!(chunks[1].text.starts_with(tail));
    }

    #[test]
    fn test_windows_cover_whole_text() {
        let chunker = TextChunker::new(small_config());
        let text = "x".repeat(345);

        let chunks = chunker.chunk(&text);

        // every window after the first re-reads `overlap` chars
        let covered: usize = chunks.iter().map(|c| c.text.len()).sum::<usize>()
            - (chunks.len() - 1) * 20;
        assert_eq!(covered, 345);
    }

    #[test]
    fn test_thesis_split() {
        let chunker = TextChunker::new(small_config());
        let text = "1) É cabível a cobrança da taxa de ocupação quando o imóvel foi adjudicado ao credor fiduciário. \
                    2) O prazo prescricional para a pretensão de repetição de indébito é de cinco anos contados do pagamento. \
                    3) A multa moratória não integra a base de cálculo do tributo devido pelo contribuinte inadimplente.";

        let chunks = chunker.chunk(text);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Thesis));
        assert!(chunks[0].text.starts_with("1)"));
        assert!(chunks[1].text.starts_with("2)"));
        assert!(chunks[2].text.starts_with("3)"));
        assert!(chunks.iter().all(|c| c.total_chunks == 3));
    }

    #[test]
    fn test_thesis_split_ignores_trivial_segments() {
        let chunker = TextChunker::new(small_config());
        // only one marker yields a long segment, so windows are used instead
        let text = format!("1) curto. 2) {}", "texto longo sem marcadores ".repeat(12));

        let chunks = chunker.chunk(&text);

        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Window));
    }

    #[test]
    fn test_chunk_utf8_multibyte_characters() {
        let chunker = TextChunker::new(small_config());
        let text = "ação judicial é válida — prescrição ✅ ".repeat(20);

        let chunks = chunker.chunk(&text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
        assert_eq!(reassemble(&chunks, 20), text);
    }

    /// Rebuild the source from windows that each re-read `overlap` chars
    fn reassemble(chunks: &[TextChunk], overlap: usize) -> String {
        let mut text = chunks[0].text.clone();
        for chunk in &chunks[1..] {
            text.extend(chunk.text.chars().skip(overlap));
        }
        text
    }

    #[test]
    fn test_windows_always_advance_over_multibyte_text() {
        let chunker = TextChunker::new(ChunkerConfig {
            threshold_chars: 10,
            window_chars: 5,
            overlap_chars: 4,
            min_chunk_chars: 0,
            min_thesis_chars: 50,
        });
        let text = "é".repeat(20);

        let chunks = chunker.chunk(&text);

        assert_eq!(chunks.len(), 16);
        assert!(chunks.iter().all(|c| c.text.chars().count() == 5));
        assert_eq!(reassemble(&chunks, 4), text);
    }

    #[test]
    fn test_overlap_not_smaller_than_window_is_clamped() {
        let chunker = TextChunker::new(ChunkerConfig {
            threshold_chars: 1,
            window_chars: 3,
            overlap_chars: 10,
            min_chunk_chars: 0,
            min_thesis_chars: 50,
        });

        let chunks = chunker.chunk("ãbçdé");

        assert_eq!(chunks.len(), 3);
        assert_eq!(reassemble(&chunks, 2), "ãbçdé");
    }

    #[test]
    fn test_threshold_counts_chars() {
        let chunker = TextChunker::new(small_config());
        // 150 chars but 300 bytes stays whole
        let text = "ç".repeat(150);
        let chunks = chunker.chunk(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Whole);
    }

    #[test]
    fn test_chunk_kind_roundtrip_str() {
        for kind in [ChunkKind::Whole, ChunkKind::Thesis, ChunkKind::Window] {
            assert_eq!(ChunkKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ChunkKind::parse("artigo"), None);
    }
}
