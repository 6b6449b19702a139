//! Model load state, broadcast to subscribers as a whole snapshot

use super::messages::ModelKind;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Idle => "idle",
            LoadStatus::Loading => "loading",
            LoadStatus::Ready => "ready",
            LoadStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelState {
    pub status: LoadStatus,
    /// Load progress, 0-100
    pub progress: u8,
}

impl ModelState {
    pub fn new(status: LoadStatus, progress: u8) -> Self {
        Self {
            status,
            progress: progress.min(100),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == LoadStatus::Ready
    }
}

/// Snapshot of both models, delivered in full on every change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub ner: ModelState,
    pub search: ModelState,
}

impl ModelStatus {
    pub fn get(&self, kind: ModelKind) -> ModelState {
        match kind {
            ModelKind::Ner => self.ner,
            ModelKind::Search => self.search,
        }
    }

    pub(crate) fn set(&mut self, kind: ModelKind, state: ModelState) {
        match kind {
            ModelKind::Ner => self.ner = state,
            ModelKind::Search => self.search = state,
        }
    }

    /// Force every model into the same state
    pub(crate) fn set_all(&mut self, state: ModelState) {
        for kind in ModelKind::ALL {
            self.set(kind, state);
        }
    }
}

/// Observer notified with the full status snapshot
pub type StatusListener = Arc<dyn Fn(&ModelStatus) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        let status = ModelStatus::default();
        for kind in ModelKind::ALL {
            assert_eq!(status.get(kind), ModelState::new(LoadStatus::Idle, 0));
        }
    }

    #[test]
    fn test_set_is_per_model() {
        let mut status = ModelStatus::default();
        status.set(ModelKind::Search, ModelState::new(LoadStatus::Ready, 100));

        assert!(status.get(ModelKind::Search).is_ready());
        assert!(!status.get(ModelKind::Ner).is_ready());
    }

    #[test]
    fn test_progress_is_capped() {
        assert_eq!(ModelState::new(LoadStatus::Loading, 250).progress, 100);
    }

    #[test]
    fn test_set_all() {
        let mut status = ModelStatus::default();
        status.set(ModelKind::Ner, ModelState::new(LoadStatus::Ready, 100));
        status.set_all(ModelState::new(LoadStatus::Error, 0));

        assert_eq!(status.ner.status, LoadStatus::Error);
        assert_eq!(status.search.status, LoadStatus::Error);
    }
}
