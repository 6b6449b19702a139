use super::transfer_service;
use juriscope_core::transfer::{DownloadKind, TransferConfig, TransferOutcome};
use juriscope_core::{Corpus, EngineConfig};
use std::io::Write;

pub async fn run(
    corpus: Corpus,
    data: bool,
    proxy_url: Option<String>,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let transfer = proxy_url.map(TransferConfig::new).unwrap_or_default();
    let service = transfer_service(config, transfer)?;
    service.resolve_needed(corpus);

    let kind = if data {
        DownloadKind::SourceData
    } else {
        DownloadKind::Embeddings
    };
    if service.status(corpus, kind).needed == Some(false) {
        println!("{} {} already present, nothing to do.", corpus, kind);
        return Ok(());
    }

    println!("Downloading {} {}...", corpus, kind);
    let on_progress = |progress: f64| {
        eprint!("\r  download {:>5.1}%", progress * 100.0);
        let _ = std::io::stderr().flush();
    };
    let on_batch = |done: usize, total: usize| {
        eprint!("\r  stored {}/{}      ", done, total);
        let _ = std::io::stderr().flush();
    };

    let result = match kind {
        DownloadKind::Embeddings => {
            service
                .download_embeddings(corpus, on_progress, on_batch)
                .await
        }
        DownloadKind::SourceData => {
            service
                .download_source_data(corpus, on_progress, on_batch)
                .await
        }
    };
    eprintln!();

    match result {
        Ok(TransferOutcome::Imported(count)) => {
            println!("Imported {} records into {}.", count, corpus);
        }
        Ok(TransferOutcome::Skipped) => {
            println!("A download for {} is already running.", corpus);
        }
        Err(e) => {
            let status = service.status(corpus, kind);
            eprintln!(
                "Download failed: {}",
                status.error.unwrap_or_else(|| e.to_string())
            );
            return Err(e.into());
        }
    }

    Ok(())
}
