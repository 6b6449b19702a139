//! The two independent document collections

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A document collection with its own vector index and filter vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Corpus {
    /// Statutes, filtered by source law
    Legislation,
    /// Case law, filtered by issuing court
    CaseLaw,
}

impl Corpus {
    pub const ALL: [Corpus; 2] = [Corpus::Legislation, Corpus::CaseLaw];

    pub fn as_str(&self) -> &'static str {
        match self {
            Corpus::Legislation => "legislation",
            Corpus::CaseLaw => "case-law",
        }
    }

    /// File name of the precomputed embeddings snapshot on the CDN
    pub fn embeddings_file(&self) -> &'static str {
        match self {
            Corpus::Legislation => "legis-embeddings.json",
            Corpus::CaseLaw => "juris-embeddings.json",
        }
    }

    /// File name of the raw source documents snapshot on the CDN
    pub fn data_file(&self) -> &'static str {
        match self {
            Corpus::Legislation => "legis-data.json",
            Corpus::CaseLaw => "juris-data.json",
        }
    }

    /// SQLite table holding this corpus' embedded chunks
    pub(crate) fn chunk_table(&self) -> &'static str {
        match self {
            Corpus::Legislation => "legislation_chunks",
            Corpus::CaseLaw => "case_law_chunks",
        }
    }
}

impl std::fmt::Display for Corpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown corpus: {0} (expected legislation or case-law)")]
pub struct UnknownCorpus(pub String);

impl FromStr for Corpus {
    type Err = UnknownCorpus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "legislation" | "legis" | "statutes" => Ok(Corpus::Legislation),
            "case-law" | "caselaw" | "juris" => Ok(Corpus::CaseLaw),
            other => Err(UnknownCorpus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_files() {
        assert_eq!(Corpus::Legislation.embeddings_file(), "legis-embeddings.json");
        assert_eq!(Corpus::CaseLaw.embeddings_file(), "juris-embeddings.json");
        assert_eq!(Corpus::Legislation.data_file(), "legis-data.json");
        assert_eq!(Corpus::CaseLaw.data_file(), "juris-data.json");
    }

    #[test]
    fn test_corpus_from_str() {
        assert_eq!("legislation".parse::<Corpus>().unwrap(), Corpus::Legislation);
        assert_eq!("Juris".parse::<Corpus>().unwrap(), Corpus::CaseLaw);
        assert!("contracts".parse::<Corpus>().is_err());
    }

    #[test]
    fn test_corpus_serialization() {
        let json = serde_json::to_string(&Corpus::CaseLaw).unwrap();
        assert_eq!(json, "\"case-law\"");
    }
}
