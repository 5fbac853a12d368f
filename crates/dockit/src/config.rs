//! Environment-driven configuration

use crate::error::IngestError;
use crate::fetchers::RendererKind;
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_SUMMARY_MODEL: &str = "DOCKIT_SUMMARY_MODEL";
pub const ENV_AGENT_MODEL: &str = "DOCKIT_AGENT_MODEL";
pub const ENV_CACHE_DIR: &str = "DOCKIT_CACHE_DIR";
pub const ENV_MANIFEST_URL: &str = "URL_TO_LLMSTXT";
pub const ENV_CONCURRENCY: &str = "DOCKIT_CONCURRENCY";
pub const ENV_MAX_PAGES: &str = "DOCKIT_MAX_PAGES";
pub const ENV_BATCH_SIZE: &str = "DOCKIT_SUMMARY_BATCH_SIZE";
pub const ENV_COOLDOWN_SECS: &str = "DOCKIT_SUMMARY_COOLDOWN_SECS";
pub const ENV_RETRY_DELAY_MS: &str = "DOCKIT_RETRY_DELAY_MS";
pub const ENV_RENDERER: &str = "DOCKIT_RENDERER";

pub const DEFAULT_CACHE_DIR: &str = ".dockit_cache";
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const MAX_CONCURRENCY: usize = 50;
pub const DEFAULT_MAX_PAGES: usize = 100;
pub const MAX_PAGES_LIMIT: usize = 500;

/// Runtime settings for ingestion, summarization and queries
#[derive(Debug, Clone)]
pub struct Config {
    /// Credentials for the summary and query service
    pub api_key: Option<String>,
    pub base_url: String,
    pub summary_model: String,
    pub agent_model: String,
    /// Absolute cache root
    pub cache_dir: PathBuf,
    /// Manifest ingested when the server starts
    pub manifest_url: Option<String>,
    pub concurrency: usize,
    pub max_pages: usize,
    pub summary_batch_size: usize,
    pub summary_cooldown: Duration,
    pub retry_delay: Duration,
    pub renderer: RendererKind,
}

impl Config {
    /// Defaults with the cache root under `cwd`
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            summary_model: DEFAULT_MODEL.to_string(),
            agent_model: DEFAULT_MODEL.to_string(),
            cache_dir: cache_dir.into(),
            manifest_url: None,
            concurrency: DEFAULT_CONCURRENCY,
            max_pages: DEFAULT_MAX_PAGES,
            summary_batch_size: 10,
            summary_cooldown: Duration::from_secs(2),
            retry_delay: Duration::from_millis(1000),
            renderer: RendererKind::default(),
        }
    }

    /// Read the process environment
    pub fn from_env() -> Result<Self, IngestError> {
        let cwd = std::env::current_dir()
            .map_err(|e| IngestError::Configuration(format!("cannot resolve working directory: {}", e)))?;
        Ok(Self::from_lookup(|key| std::env::var(key).ok(), &cwd))
    }

    /// Build from an arbitrary variable lookup; relative cache paths resolve against `cwd`
    pub fn from_lookup<F>(lookup: F, cwd: &Path) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let cache_dir = PathBuf::from(get(ENV_CACHE_DIR).unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string()));
        let cache_dir = if cache_dir.is_absolute() {
            cache_dir
        } else {
            cwd.join(cache_dir)
        };

        let mut config = Self::with_cache_dir(cache_dir);
        config.api_key = get(ENV_API_KEY);
        if let Some(base_url) = get(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Some(model) = get(ENV_SUMMARY_MODEL) {
            config.summary_model = model;
        }
        if let Some(model) = get(ENV_AGENT_MODEL) {
            config.agent_model = model;
        }
        config.manifest_url = get(ENV_MANIFEST_URL);
        config.concurrency = clamp_concurrency(parse_or(get(ENV_CONCURRENCY), ENV_CONCURRENCY, DEFAULT_CONCURRENCY));
        config.max_pages = clamp_max_pages(parse_or(get(ENV_MAX_PAGES), ENV_MAX_PAGES, DEFAULT_MAX_PAGES));
        config.summary_batch_size = parse_or(get(ENV_BATCH_SIZE), ENV_BATCH_SIZE, 10usize).max(1);
        config.summary_cooldown = Duration::from_secs(parse_or(get(ENV_COOLDOWN_SECS), ENV_COOLDOWN_SECS, 2u64));
        config.retry_delay = Duration::from_millis(parse_or(get(ENV_RETRY_DELAY_MS), ENV_RETRY_DELAY_MS, 1000u64));
        if let Some(raw) = get(ENV_RENDERER) {
            match RendererKind::parse(&raw) {
                Some(kind) => config.renderer = kind,
                None => warn!(key = ENV_RENDERER, value = %raw, "Unknown renderer, using http"),
            }
        }
        config
    }

    /// Credentials required by ingestion
    pub fn require_api_key(&self) -> Result<&str, IngestError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| IngestError::Configuration(format!("{} is not set", ENV_API_KEY)))
    }
}

/// Worker count within `1..=50`
pub fn clamp_concurrency(n: usize) -> usize {
    n.clamp(1, MAX_CONCURRENCY)
}

/// Page cap within `1..=500`
pub fn clamp_max_pages(n: usize) -> usize {
    n.clamp(1, MAX_PAGES_LIMIT)
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!(key, value = %value, "Invalid numeric setting, using default");
            default
        }),
        None => default,
    }
}
