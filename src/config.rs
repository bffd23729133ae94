use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::request::{ApiType, ResponseFormat};
use crate::weave::WeaveStrategy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub notes: Option<NotesConfig>,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub weave: WeaveConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// No timeout unless set; the HTTP client's defaults apply.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "gemma2:9b-instruct-q5_K_M".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_api_type")]
    pub api_type: String,
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            api_type: default_api_type(),
            format: default_format(),
        }
    }
}

fn default_chunk_size() -> usize {
    1024
}
fn default_api_type() -> String {
    "generate".to_string()
}
fn default_format() -> String {
    "json".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    #[serde(default = "default_multiplicity")]
    pub file_multiplicity: usize,
    #[serde(default = "default_multiplicity")]
    pub chunk_multiplicity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            file_multiplicity: default_multiplicity(),
            chunk_multiplicity: default_multiplicity(),
        }
    }
}

fn default_multiplicity() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotesConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtractConfig {
    /// Replaces the built-in key-concept prompt when set.
    #[serde(default)]
    pub instruction: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeaveConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            threshold: default_threshold(),
            top_k: default_top_k(),
        }
    }
}

fn default_strategy() -> String {
    "vector,similarity,threshold".to_string()
}
fn default_threshold() -> f32 {
    0.8
}
fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendsConfig {
    #[serde(default = "default_hosted")]
    pub hosted: Vec<HostedBackendConfig>,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            hosted: default_hosted(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HostedBackendConfig {
    pub name: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    pub context_length: usize,
    #[serde(default)]
    pub embedding_length: Option<usize>,
    pub cost_per_token: f64,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_hosted() -> Vec<HostedBackendConfig> {
    vec![
        HostedBackendConfig {
            name: "gpt-4o-mini".to_string(),
            api_key_env: default_api_key_env(),
            context_length: 128_000,
            embedding_length: None,
            cost_per_token: 0.15 / 1_000_000.0,
        },
        HostedBackendConfig {
            name: "text-embedding-3-small".to_string(),
            api_key_env: default_api_key_env(),
            context_length: 8191,
            embedding_length: Some(1536),
            cost_per_token: 0.02 / 1_000_000.0,
        },
    ]
}

impl Config {
    /// Config with defaults everywhere except the database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            llm: LlmConfig::default(),
            dispatch: DispatchConfig::default(),
            pool: PoolConfig::default(),
            notes: None,
            extract: ExtractConfig::default(),
            weave: WeaveConfig::default(),
            backends: BackendsConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate dispatch
    if config.dispatch.chunk_size == 0 {
        anyhow::bail!("dispatch.chunk_size must be > 0");
    }

    match config.dispatch.api_type.parse::<ApiType>()? {
        ApiType::Generate | ApiType::Chat => {}
        ApiType::Embeddings => anyhow::bail!(
            "dispatch.api_type cannot be 'embeddings'. Must be generate or chat."
        ),
    }
    config.dispatch.format.parse::<ResponseFormat>()?;

    // Validate pools
    if config.pool.file_multiplicity == 0 {
        anyhow::bail!("pool.file_multiplicity must be >= 1");
    }
    if config.pool.chunk_multiplicity == 0 {
        anyhow::bail!("pool.chunk_multiplicity must be >= 1");
    }

    // Validate llm
    let base = config.llm.base_url.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        anyhow::bail!("llm.base_url must start with http:// or https://");
    }
    if config.llm.model.trim().is_empty() {
        anyhow::bail!("llm.model must not be empty");
    }

    // Validate weave
    if !(-1.0..=1.0).contains(&config.weave.threshold) {
        anyhow::bail!("weave.threshold must be in [-1.0, 1.0]");
    }
    if config.weave.top_k == 0 {
        anyhow::bail!("weave.top_k must be >= 1");
    }
    config.weave.strategy.parse::<WeaveStrategy>()?;

    for hosted in &config.backends.hosted {
        if hosted.name.trim().is_empty() {
            anyhow::bail!("backends.hosted entries must have a name");
        }
    }

    Ok(())
}
