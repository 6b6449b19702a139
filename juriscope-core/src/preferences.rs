//! Durable user preferences
//!
//! A small JSON file of boolean flags, read once at startup. A missing or
//! unreadable file never blocks startup; defaults are used instead.

use crate::corpus::Corpus;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum PreferencesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PreferencesError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// The user declined the statute download prompt
    pub legislation_prompt_dismissed: bool,
    /// The user declined the case-law download prompt
    pub case_law_prompt_dismissed: bool,
    pub legislation_search_enabled: bool,
    pub case_law_search_enabled: bool,
}

impl Preferences {
    /// Read preferences, falling back to defaults
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read preferences, using defaults");
                return Self::default();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "invalid preferences file, using defaults");
            Self::default()
        })
    }

    /// Write atomically: temp file, then rename over the target
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(self)?;

        if let Err(e) = std::fs::write(&temp_path, json) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    pub fn prompt_dismissed(&self, corpus: Corpus) -> bool {
        match corpus {
            Corpus::Legislation => self.legislation_prompt_dismissed,
            Corpus::CaseLaw => self.case_law_prompt_dismissed,
        }
    }

    pub fn set_prompt_dismissed(&mut self, corpus: Corpus, dismissed: bool) {
        match corpus {
            Corpus::Legislation => self.legislation_prompt_dismissed = dismissed,
            Corpus::CaseLaw => self.case_law_prompt_dismissed = dismissed,
        }
    }

    pub fn search_enabled(&self, corpus: Corpus) -> bool {
        match corpus {
            Corpus::Legislation => self.legislation_search_enabled,
            Corpus::CaseLaw => self.case_law_search_enabled,
        }
    }

    pub fn set_search_enabled(&mut self, corpus: Corpus, enabled: bool) {
        match corpus {
            Corpus::Legislation => self.legislation_search_enabled = enabled,
            Corpus::CaseLaw => self.case_law_search_enabled = enabled,
        }
    }
}
