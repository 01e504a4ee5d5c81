pub mod ask;
pub mod ingest;
pub mod plan;
pub mod session;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use switchboard::config::Settings;

/// Settings from defaults, environment and `--config`, with an `--index`
/// override applied last
pub fn load_settings(config: Option<&Path>, index: Option<PathBuf>) -> Result<Settings> {
    let mut settings = Settings::load(config).context("Failed to load settings")?;
    if let Some(index) = index {
        settings.retrieval.index_dir = index;
    }
    Ok(settings)
}
