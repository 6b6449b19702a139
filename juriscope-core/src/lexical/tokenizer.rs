//! Term extraction for the lexical index

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Prepositions, conjunctions and generic procedural nouns (already folded)
const STOPWORDS: &[&str] = &[
    "que", "para", "com", "por", "uma", "uns", "umas", "dos", "das", "nos", "nas", "aos", "pelo",
    "pela", "pelos", "pelas", "como", "mais", "menos", "sua", "seu", "suas", "seus", "este",
    "esta", "estes", "estas", "esse", "essa", "esses", "essas", "isso", "isto", "aquele",
    "aquela", "ser", "sobre", "entre", "quando", "onde", "qual", "quais", "nao", "sem", "sob",
    "ate", "apos", "desde", "perante", "contra", "mas", "porem", "pois", "porque", "tambem",
    "sendo", "tendo", "foi", "sao", "ter", "tem", "deve", "devem", "pode", "podem", "art",
    "artigo", "artigos", "lei", "inciso", "incisos", "paragrafo", "caput", "alinea", "processo",
    "autos", "parte", "partes", "juizo", "fls", "folhas", "termos", "presente", "referido",
    "referida", "conforme", "acordo", "caso", "forma", "modo",
];

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

fn markup_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("markup tag pattern is valid"))
}

/// Lowercase and strip diacritics
pub fn fold(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

pub fn is_stopword(term: &str) -> bool {
    stopwords().contains(term)
}

/// Split a text into index terms
pub fn tokenize(text: &str) -> Vec<String> {
    let without_tags = markup_tag().replace_all(text, " ");
    let letters: String = fold(&without_tags)
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect();

    letters
        .split_whitespace()
        .filter(|term| term.chars().count() > 2 && !is_stopword(term))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_strips_diacritics() {
        assert_eq!(fold("Ação Possessória"), "acao possessoria");
    }

    #[test]
    fn test_tokenize_drops_short_words_and_stopwords() {
        let terms = tokenize("O contrato de locação foi rescindido pela parte ré");
        assert_eq!(terms, vec!["contrato", "locacao", "rescindido"]);
    }

    #[test]
    fn test_tokenize_strips_markup_digits_and_punctuation() {
        let terms = tokenize("<p>Prazo de <b>15</b> dias!</p> Usucapião, extraordinária.");
        assert_eq!(terms, vec!["prazo", "dias", "usucapiao", "extraordinaria"]);
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("<br/> 123 --").is_empty());
    }

    #[test]
    fn test_stopwords_are_folded() {
        assert!(is_stopword("nao"));
        assert!(is_stopword("paragrafo"));
        assert!(!is_stopword("locacao"));
    }
}
