use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub path: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_page_size() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub url: String,
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_retry_on_conflict")]
    pub retry_on_conflict: u32,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,
    #[serde(default = "default_index_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_index_name() -> String {
    "path-resolver-taxonomy".to_string()
}
fn default_chunk_size() -> usize {
    200
}
fn default_workers() -> usize {
    4
}
fn default_retry_on_conflict() -> u32 {
    5
}
fn default_refresh_interval() -> String {
    "10s".to_string()
}
fn default_index_timeout_secs() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct PacingConfig {
    /// Estimated records the index absorbs per second of pause.
    #[serde(default = "default_records_per_second")]
    pub records_per_second: u64,
    #[serde(default = "default_delay_secs")]
    pub default_delay_secs: u64,
    /// Stats endpoint template, e.g. `https://host/idresolver/stats/{lettercode}`.
    #[serde(default)]
    pub stats_url: Option<String>,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            records_per_second: default_records_per_second(),
            default_delay_secs: default_delay_secs(),
            stats_url: None,
        }
    }
}

fn default_records_per_second() -> u64 {
    100_000
}
fn default_delay_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReferenceConfig {
    /// Static-data service; the local files are used when it is unset or unreachable.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_eras_file")]
    pub eras_file: PathBuf,
    #[serde(default = "default_guides_file")]
    pub guides_file: PathBuf,
    #[serde(default = "default_integer_map_file")]
    pub integer_map_file: PathBuf,
    #[serde(default)]
    pub taxonomy_dir: Option<PathBuf>,
    #[serde(default = "default_reference_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            eras_file: default_eras_file(),
            guides_file: default_guides_file(),
            integer_map_file: default_integer_map_file(),
            taxonomy_dir: None,
            timeout_secs: default_reference_timeout_secs(),
        }
    }
}

fn default_eras_file() -> PathBuf {
    PathBuf::from("staticfiles/eras.json")
}
fn default_guides_file() -> PathBuf {
    PathBuf::from("staticfiles/flattened_guides.json")
}
fn default_integer_map_file() -> PathBuf {
    PathBuf::from("staticfiles/researchguide_map.json")
}
fn default_reference_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

impl IndexConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PacingConfig {
    pub fn default_delay(&self) -> Duration {
        Duration::from_secs(self.default_delay_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.source.page_size == 0 {
        anyhow::bail!("source.page_size must be > 0");
    }

    if config.index.name.trim().is_empty() {
        anyhow::bail!("index.name must not be empty");
    }
    if !(config.index.url.starts_with("http://") || config.index.url.starts_with("https://")) {
        anyhow::bail!(
            "index.url must start with http:// or https://, got '{}'",
            config.index.url
        );
    }
    if config.index.chunk_size == 0 {
        anyhow::bail!("index.chunk_size must be > 0");
    }
    if config.index.workers == 0 {
        anyhow::bail!("index.workers must be > 0");
    }

    if config.pacing.records_per_second == 0 {
        anyhow::bail!("pacing.records_per_second must be > 0");
    }

    Ok(())
}
