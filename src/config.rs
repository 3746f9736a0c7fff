//! Configuration loading and validation.
//!
//! brainstore reads a single TOML file (`--config`, default
//! `./config/brainstore.toml`). Sections other than `[db]` are optional and
//! fall back to the defaults below. A few values can be overridden from the
//! environment after parsing:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `MAX_BRAIN_SIZE` | `quota.max_brain_size` |
//! | `MAX_BRAIN_SIZE_WITH_KEY` | `quota.max_brain_size_with_key` |
//!
//! `OPENAI_API_KEY` is read by the OpenAI embedder, not here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use brainstore_core::chunk::ChunkParams;
use brainstore_core::quota::QuotaPolicy;
use serde::Deserialize;

use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: 0,
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

fn default_chunk_size() -> usize {
    brainstore_core::chunk::DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuotaConfig {
    #[serde(default = "default_max_brain_size")]
    pub max_brain_size: u64,
    #[serde(default = "default_max_brain_size_with_key")]
    pub max_brain_size_with_key: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_brain_size: default_max_brain_size(),
            max_brain_size_with_key: default_max_brain_size_with_key(),
        }
    }
}

impl QuotaConfig {
    pub fn policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            max_brain_size: self.max_brain_size,
            max_brain_size_with_key: self.max_brain_size_with_key,
        }
    }
}

fn default_max_brain_size() -> u64 {
    52_428_800
}
fn default_max_brain_size_with_key() -> u64 {
    209_715_200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Store access tuning: lookup batching, fan-out, and write retries.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_lookup_batch_size")]
    pub lookup_batch_size: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_store_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_orphan_min_age_secs")]
    pub orphan_min_age_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lookup_batch_size: default_lookup_batch_size(),
            max_concurrency: default_max_concurrency(),
            max_retries: default_store_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            orphan_min_age_secs: default_orphan_min_age_secs(),
        }
    }
}

impl StoreConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay_ms: self.retry_base_delay_ms,
        }
    }
}

fn default_lookup_batch_size() -> usize {
    5
}
fn default_max_concurrency() -> usize {
    8
}
fn default_store_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    100
}
fn default_orphan_min_age_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5050".to_string()
}
fn default_max_upload_bytes() -> usize {
    209_715_200
}

/// Log filter levels. `RUST_LOG` takes precedence when set.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// All-defaults configuration pointing at `db_path`, embeddings disabled.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            quota: QuotaConfig::default(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!("chunking.chunk_overlap must be < chunking.chunk_size");
        }

        if self.quota.max_brain_size > self.quota.max_brain_size_with_key {
            anyhow::bail!("quota.max_brain_size must be <= quota.max_brain_size_with_key");
        }

        if self.store.lookup_batch_size == 0 {
            anyhow::bail!("store.lookup_batch_size must be > 0");
        }
        if self.store.max_concurrency == 0 {
            anyhow::bail!("store.max_concurrency must be > 0");
        }

        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }
        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        Ok(())
    }
}

/// Apply `MAX_BRAIN_SIZE` / `MAX_BRAIN_SIZE_WITH_KEY` from the environment.
fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(value) = std::env::var("MAX_BRAIN_SIZE") {
        config.quota.max_brain_size = value
            .trim()
            .parse()
            .with_context(|| format!("MAX_BRAIN_SIZE is not a byte count: '{}'", value))?;
    }
    if let Ok(value) = std::env::var("MAX_BRAIN_SIZE_WITH_KEY") {
        config.quota.max_brain_size_with_key = value.trim().parse().with_context(|| {
            format!("MAX_BRAIN_SIZE_WITH_KEY is not a byte count: '{}'", value)
        })?;
    }
    Ok(())
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    apply_env_overrides(&mut config)?;
    config.validate()?;

    Ok(config)
}
