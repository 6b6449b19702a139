//! Engine configuration

use std::path::{Path, PathBuf};

/// Directory layout of a juriscope installation
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base directory for data storage
    pub data_dir: PathBuf,
}

impl EngineConfig {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Directory holding the ONNX models and tokenizers
    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    /// SQLite database shared by the vector indexes and the document store
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("juriscope.db")
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join("preferences.json")
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("juriscope");
        Self::new(data_dir)
    }
}
