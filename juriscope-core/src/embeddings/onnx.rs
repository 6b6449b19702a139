//! ONNX Runtime backend
//!
//! Hosts a multilingual sentence-embedding model and a token-classification
//! model for legal entity recognition. Model files must already be present
//! on disk.

use super::model::InferenceBackend;
use super::{EmbeddingError, Result};
use crate::inference::{ModelKind, NerToken, Pooling};
use crate::similarity::l2_normalize;
use ndarray::{ArrayViewD, Axis};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokenizers::{Encoding, Tokenizer, TruncationParams};
use tracing::{debug, info};

/// Configuration for one ONNX model
#[derive(Debug, Clone)]
pub struct OnnxModelConfig {
    /// Path to the ONNX model file
    pub model_path: PathBuf,
    /// Path to the tokenizer JSON file
    pub tokenizer_path: PathBuf,
    /// Path to the HuggingFace `config.json` (holds `id2label` for NER)
    pub config_path: Option<PathBuf>,
    /// Maximum sequence length
    pub max_length: usize,
}

impl OnnxModelConfig {
    /// Create config for multilingual-e5-small
    pub fn multilingual_e5_small(models_dir: impl AsRef<Path>) -> Self {
        let models_dir = models_dir.as_ref();
        Self {
            model_path: models_dir.join("multilingual-e5-small.onnx"),
            tokenizer_path: models_dir.join("multilingual-e5-small-tokenizer.json"),
            config_path: None,
            max_length: 512,
        }
    }

    /// Create config for the Portuguese legal NER model
    pub fn legal_ner(models_dir: impl AsRef<Path>) -> Self {
        let models_dir = models_dir.as_ref();
        Self {
            model_path: models_dir.join("legal-ner.onnx"),
            tokenizer_path: models_dir.join("legal-ner-tokenizer.json"),
            config_path: Some(models_dir.join("legal-ner-config.json")),
            max_length: 512,
        }
    }
}

fn ort_error(e: impl std::fmt::Display) -> EmbeddingError {
    EmbeddingError::Ort(e.to_string())
}

#[derive(Deserialize)]
struct LabelConfig {
    id2label: HashMap<String, String>,
}

struct LoadedModel {
    session: Session,
    tokenizer: Tokenizer,
}

impl LoadedModel {
    fn load(config: &OnnxModelConfig, progress: &mut dyn FnMut(u8)) -> Result<Self> {
        progress(0);

        let mut tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| EmbeddingError::Tokenizer(format!("Failed to load tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
        progress(20);

        let session = Session::builder()
            .map_err(ort_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_error)?
            .commit_from_file(&config.model_path)
            .map_err(|e| {
                EmbeddingError::Ort(format!(
                    "Failed to load ONNX model {}: {e}",
                    config.model_path.display()
                ))
            })?;
        progress(100);

        Ok(Self { session, tokenizer })
    }

    fn encode(&self, text: &str) -> Result<Encoding> {
        self.tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Tokenizer(format!("Tokenization failed: {e}")))
    }

    /// Run the model on one encoded text, returning the first output
    fn run(&mut self, encoding: &Encoding) -> Result<ndarray::ArrayD<f32>> {
        let seq_len = encoding.get_ids().len();
        let to_i64 = |values: &[u32]| values.iter().map(|&v| v as i64).collect::<Vec<i64>>();

        let input_ids = Tensor::from_array(([1, seq_len], to_i64(encoding.get_ids())))
            .map_err(ort_error)?;
        let attention_mask =
            Tensor::from_array(([1, seq_len], to_i64(encoding.get_attention_mask())))
                .map_err(ort_error)?;
        let token_type_ids = Tensor::from_array(([1, seq_len], to_i64(encoding.get_type_ids())))
            .map_err(ort_error)?;

        let inputs = ort::inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
            "token_type_ids" => token_type_ids,
        ];
        let outputs = self.session.run(inputs).map_err(ort_error)?;

        let array: ArrayViewD<f32> = outputs[0].try_extract_array().map_err(ort_error)?;
        Ok(array.to_owned())
    }
}

/// Real backend using ONNX Runtime
pub struct OnnxBackend {
    search_config: OnnxModelConfig,
    ner_config: OnnxModelConfig,
    search: Option<LoadedModel>,
    ner: Option<(LoadedModel, Vec<String>)>,
}

impl OnnxBackend {
    pub fn new(search_config: OnnxModelConfig, ner_config: OnnxModelConfig) -> Self {
        Self {
            search_config,
            ner_config,
            search: None,
            ner: None,
        }
    }

    /// Default model layout under a models directory
    pub fn from_models_dir(models_dir: impl AsRef<Path>) -> Self {
        Self::new(
            OnnxModelConfig::multilingual_e5_small(&models_dir),
            OnnxModelConfig::legal_ner(&models_dir),
        )
    }

    fn read_labels(config: &OnnxModelConfig) -> Result<Vec<String>> {
        let path = config
            .config_path
            .as_ref()
            .ok_or_else(|| EmbeddingError::Model("NER model has no config.json".to_string()))?;
        let parsed: LabelConfig = serde_json::from_str(&std::fs::read_to_string(path)?)?;

        let mut labels = vec![String::from("O"); parsed.id2label.len()];
        for (id, label) in parsed.id2label {
            let index: usize = id
                .parse()
                .map_err(|_| EmbeddingError::Model(format!("Invalid label id: {id}")))?;
            if index >= labels.len() {
                return Err(EmbeddingError::Model(format!("Label id out of range: {id}")));
            }
            labels[index] = label;
        }
        Ok(labels)
    }

    /// Mean pooling over non-padding tokens, or the first token for CLS pooling
    fn pool(hidden: &ndarray::ArrayD<f32>, mask: &[u32], pooling: Pooling) -> Result<Vec<f32>> {
        match hidden.ndim() {
            2 => Ok(hidden.iter().copied().collect()),
            3 => {
                let tokens = hidden.index_axis(Axis(0), 0);
                match pooling {
                    Pooling::Cls => Ok(tokens.index_axis(Axis(0), 0).iter().copied().collect()),
                    Pooling::Mean => {
                        let dim = tokens.shape()[1];
                        let mut sum = vec![0.0f32; dim];
                        let mut count = 0.0f32;
                        for (row, &m) in tokens.outer_iter().zip(mask) {
                            if m == 0 {
                                continue;
                            }
                            for (acc, v) in sum.iter_mut().zip(row.iter()) {
                                *acc += v;
                            }
                            count += 1.0;
                        }
                        if count > 0.0 {
                            sum.iter_mut().for_each(|x| *x /= count);
                        }
                        Ok(sum)
                    }
                }
            }
            _ => Err(EmbeddingError::Model(format!(
                "Unexpected output shape: {:?}",
                hidden.shape()
            ))),
        }
    }
}

impl InferenceBackend for OnnxBackend {
    fn load(&mut self, kind: ModelKind, progress: &mut dyn FnMut(u8)) -> Result<()> {
        if self.is_loaded(kind) {
            progress(100);
            return Ok(());
        }
        match kind {
            ModelKind::Search => {
                self.search = Some(LoadedModel::load(&self.search_config, progress)?);
            }
            ModelKind::Ner => {
                let labels = Self::read_labels(&self.ner_config)?;
                let model = LoadedModel::load(&self.ner_config, progress)?;
                self.ner = Some((model, labels));
            }
        }
        info!(model = %kind, "ONNX model loaded");
        Ok(())
    }

    fn unload(&mut self, kind: ModelKind) {
        let dropped = match kind {
            ModelKind::Search => self.search.take().is_some(),
            ModelKind::Ner => self.ner.take().is_some(),
        };
        if dropped {
            debug!(model = %kind, "ONNX model unloaded");
        }
    }

    fn is_loaded(&self, kind: ModelKind) -> bool {
        match kind {
            ModelKind::Search => self.search.is_some(),
            ModelKind::Ner => self.ner.is_some(),
        }
    }

    fn recognize(&mut self, text: &str) -> Result<Vec<NerToken>> {
        let (model, labels) = self
            .ner
            .as_mut()
            .ok_or(EmbeddingError::NotLoaded(ModelKind::Ner.as_str()))?;

        let encoding = model.encode(text)?;
        let logits = model.run(&encoding)?;
        if logits.ndim() != 3 {
            return Err(EmbeddingError::Model(format!(
                "Unexpected logits shape: {:?}",
                logits.shape()
            )));
        }
        let rows = logits.index_axis(Axis(0), 0);

        let mut tokens = Vec::new();
        for (i, row) in rows.outer_iter().enumerate() {
            if encoding.get_special_tokens_mask().get(i) == Some(&1) {
                continue;
            }
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let total: f32 = row.iter().map(|&x| (x - max).exp()).sum();
            let (best, best_logit) = row
                .iter()
                .copied()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |acc, (j, x)| if x > acc.1 { (j, x) } else { acc });

            let (start, end) = encoding.get_offsets().get(i).copied().unwrap_or((0, 0));
            tokens.push(NerToken {
                word: encoding.get_tokens().get(i).cloned().unwrap_or_default(),
                entity: labels.get(best).cloned().unwrap_or_else(|| "O".to_string()),
                score: (best_logit - max).exp() / total,
                start: Some(start),
                end: Some(end),
            });
        }
        Ok(tokens)
    }

    fn embed(&mut self, text: &str, pooling: Pooling) -> Result<Vec<f32>> {
        let model = self
            .search
            .as_mut()
            .ok_or(EmbeddingError::NotLoaded(ModelKind::Search.as_str()))?;

        let encoding = model.encode(text)?;
        let hidden = model.run(&encoding)?;
        let mut embedding = Self::pool(&hidden, encoding.get_attention_mask(), pooling)?;
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array3};
    use tempfile::tempdir;

    #[test]
    fn test_model_paths() {
        let search = OnnxModelConfig::multilingual_e5_small("/models");
        assert_eq!(search.model_path, PathBuf::from("/models/multilingual-e5-small.onnx"));
        assert!(search.config_path.is_none());

        let ner = OnnxModelConfig::legal_ner("/models");
        assert_eq!(
            ner.config_path,
            Some(PathBuf::from("/models/legal-ner-config.json"))
        );
    }

    #[test]
    fn test_read_labels() {
        let dir = tempdir().unwrap();
        let mut config = OnnxModelConfig::legal_ner(dir.path());
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"id2label": {"0": "O", "2": "I-ORG", "1": "B-ORG"}, "model_type": "bert"}"#,
        )
        .unwrap();
        config.config_path = Some(path);

        let labels = OnnxBackend::read_labels(&config).unwrap();
        assert_eq!(labels, vec!["O", "B-ORG", "I-ORG"]);
    }

    #[test]
    fn test_read_labels_rejects_out_of_range() {
        let dir = tempdir().unwrap();
        let mut config = OnnxModelConfig::legal_ner(dir.path());
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"id2label": {"0": "O", "5": "B-PER"}}"#).unwrap();
        config.config_path = Some(path);

        assert!(OnnxBackend::read_labels(&config).is_err());
    }

    #[test]
    fn test_mean_pool_skips_padding() {
        let mut hidden = Array3::<f32>::zeros((1, 3, 2));
        hidden[[0, 0, 0]] = 1.0;
        hidden[[0, 1, 0]] = 3.0;
        hidden[[0, 2, 0]] = 100.0;
        let hidden = hidden.into_dyn();

        let pooled = OnnxBackend::pool(&hidden, &[1, 1, 0], Pooling::Mean).unwrap();
        assert_eq!(pooled, vec![2.0, 0.0]);

        let cls = OnnxBackend::pool(&hidden, &[1, 1, 0], Pooling::Cls).unwrap();
        assert_eq!(cls, vec![1.0, 0.0]);
    }

    #[test]
    fn test_pool_already_pooled() {
        let hidden = arr2(&[[0.5f32, 0.5]]).into_dyn();
        let pooled = OnnxBackend::pool(&hidden, &[1], Pooling::Mean).unwrap();
        assert_eq!(pooled, vec![0.5, 0.5]);
    }

    #[test]
    fn test_missing_model_files() {
        let dir = tempdir().unwrap();
        let mut backend = OnnxBackend::from_models_dir(dir.path());

        assert!(backend.load(ModelKind::Search, &mut |_| {}).is_err());
        assert!(!backend.is_loaded(ModelKind::Search));
        assert!(backend.embed("texto", Pooling::Mean).is_err());
    }
}
