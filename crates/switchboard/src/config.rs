//! Runtime settings.
//!
//! Layered lowest to highest: built-in defaults, the conventional variables
//! (`OPENAI_API_KEY`, `TAVILY_API_KEY`, ...), an optional config file, then
//! `SWITCHBOARD_`-prefixed variables with `__` between nesting levels, e.g.
//! `SWITCHBOARD_RETRIEVAL__INDEX_DIR`.

use std::env;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::model::{ModelConfig, DEFAULT_MODEL};
use crate::providers::embeddings::DEFAULT_EMBEDDING_MODEL;
use crate::providers::openai::OpenAiProviderConfig;
use crate::tools::web_search::SearchConfig;
use crate::validate::{
    PlanValidator, DEFAULT_BLOCKED_PHRASES, DEFAULT_MAX_STEPS, DEFAULT_MIN_KEYWORD_LEN,
};

pub const ENV_PREFIX: &str = "SWITCHBOARD";

/// Conventional variables and the setting each one feeds
const FALLBACK_VARS: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "provider.api_key"),
    ("MODEL_NAME", "provider.model"),
    ("TAVILY_API_KEY", "search.api_key"),
    ("INDEX_DIR", "retrieval.index_dir"),
    ("EMBEDDINGS_MODEL", "retrieval.embedding_model"),
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_openai_host")]
    pub host: String,
    #[serde(default = "default_chat_path")]
    pub base_path: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            host: default_openai_host(),
            base_path: default_chat_path(),
            api_key: None,
            model: default_model(),
            temperature: None,
            max_tokens: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl ProviderSettings {
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig::new(self.model.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    pub fn chat_config(&self) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host: self.host.clone(),
            base_path: self.base_path.clone(),
            api_key: self.api_key.clone().filter(|k| !k.trim().is_empty()),
            timeout: self.timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_path")]
    pub embedding_path: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            top_k: default_top_k(),
            embedding_model: default_embedding_model(),
            embedding_path: default_embedding_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorSettings {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_min_keyword_len")]
    pub min_keyword_len: usize,
    #[serde(default = "default_blocked_phrases")]
    pub blocked_phrases: Vec<String>,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            min_keyword_len: default_min_keyword_len(),
            blocked_phrases: default_blocked_phrases(),
        }
    }
}

impl ValidatorSettings {
    pub fn validator(&self) -> PlanValidator {
        PlanValidator::new(
            self.max_steps,
            self.min_keyword_len,
            self.blocked_phrases.clone(),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub validator: ValidatorSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load settings, layering `config_file` (any format the `config` crate
    /// recognises by extension) between the defaults and the environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for (var, key) in FALLBACK_VARS {
            if let Some(value) = non_empty_var(var) {
                builder = builder.set_default(*key, value)?;
            }
        }
        // An OpenAI-compatible base URL already ends in the API version
        if let Some(base_url) = non_empty_var("OPENAI_BASE_URL") {
            let host = format!("{}/", base_url.trim_end_matches('/'));
            builder = builder
                .set_default("provider.host", host)?
                .set_default("provider.base_path", "chat/completions")?
                .set_default("retrieval.embedding_path", "embeddings")?;
        }

        if let Some(path) = config_file {
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("validator.blocked_phrases"),
            )
            .build()?;

        let settings: Settings = config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            ConfigError::Other(err)
        })?;
        Ok(settings)
    }

    /// Settings for the embeddings endpoint, which shares the chat host and key
    pub fn embedding_config(&self) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            base_path: self.retrieval.embedding_path.clone(),
            ..self.provider.chat_config()
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_chat_path() -> String {
    "v1/chat/completions".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout() -> u64 {
    600
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("data/index")
}

fn default_top_k() -> usize {
    4
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_path() -> String {
    "v1/embeddings".to_string()
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_batch_size() -> usize {
    64
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_min_keyword_len() -> usize {
    DEFAULT_MIN_KEYWORD_LEN
}

fn default_blocked_phrases() -> Vec<String> {
    DEFAULT_BLOCKED_PHRASES
        .iter()
        .map(|p| p.to_string())
        .collect()
}
