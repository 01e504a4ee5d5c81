use std::path::{Path, PathBuf};

use anyhow::Result;
use console::style;
use switchboard::ingest::{ingest, IngestOptions};
use switchboard::providers::OpenAiEmbedder;
use tracing::info;

use super::load_settings;

pub async fn handle_ingest(config: Option<&Path>, docs: &Path, index: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(config, index)?;
    let embedder = OpenAiEmbedder::new(
        settings.embedding_config(),
        settings.retrieval.embedding_model.clone(),
    )?;
    info!(
        docs = %docs.display(),
        index = %settings.retrieval.index_dir.display(),
        "ingesting documents"
    );

    eprintln!(
        "{} {}",
        style("Embedding model:").cyan(),
        settings.retrieval.embedding_model
    );
    let report = ingest(
        docs,
        &settings.retrieval.index_dir,
        &embedder,
        IngestOptions::from(&settings.retrieval),
    )
    .await?;

    println!(
        "{} → {} (files: {}, items: {})",
        style("Index built").green(),
        report.index_path.display(),
        report.files,
        report.chunks
    );
    Ok(())
}
