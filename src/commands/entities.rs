use anyhow::{bail, Context};
use juriscope_core::embeddings::{MockBackend, OnnxBackend};
use juriscope_core::{EngineConfig, InferenceClient, InferenceConfig};
use std::path::Path;

pub async fn run(
    path: &Path,
    mock: bool,
    mock_entities: &[String],
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let client = if mock {
        let mut backend = MockBackend::new(8);
        for entry in mock_entities {
            let Some((phrase, label)) = entry.rsplit_once('=') else {
                bail!("Invalid --mock-entity {:?}, expected PHRASE=LABEL", entry);
            };
            backend = backend.with_entity(phrase, label);
        }
        InferenceClient::with_backend(InferenceConfig::default(), move || backend.clone())
    } else {
        let models_dir = config.models_dir();
        InferenceClient::with_backend(InferenceConfig::default(), move || {
            OnnxBackend::from_models_dir(&models_dir)
        })
    };

    let result = client.extract_entities(&text).await;
    client.cleanup();
    let entities = result?;

    if entities.is_empty() {
        println!("No entities found.");
        return Ok(());
    }

    for entity in &entities {
        println!("{}", serde_json::to_string(entity)?);
    }

    Ok(())
}
