use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = concat!("wikipage/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONFIG_PATH: &str = ".wikipage/config.toml";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiConfig {
    #[serde(default)]
    pub wiki: WikiSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub base_url: Option<String>,
    pub default_space: Option<String>,
    pub default_parent_page: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub chunk_size: Option<usize>,
}

/// Settings for one process, resolved once at startup: env > config file > default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub base_url: String,
    pub token: String,
    pub default_space: Option<String>,
    pub default_parent_page: Option<String>,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub chunk_size: Option<usize>,
}

impl ServiceConfig {
    pub fn from_env(file: &WikiConfig) -> Result<Self> {
        Self::from_lookup(file, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(file: &WikiConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let token = match value("WIKI_TOKEN") {
            Some(token) => token,
            None => bail!("WIKI_TOKEN is not set; export WIKI_TOKEN='<api token>'"),
        };
        let base_url = value("WIKI_BASE_URL")
            .or_else(|| non_empty(file.wiki.base_url.as_deref()))
            .ok_or_else(|| {
                anyhow::anyhow!("WIKI_BASE_URL is not set and [wiki].base_url is missing")
            })?;
        let timeout_ms = match value("WIKI_HTTP_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("invalid WIKI_HTTP_TIMEOUT_MS: {raw}"))?,
            None => file.wiki.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        };

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            default_space: value("WIKI_DEFAULT_SPACE")
                .or_else(|| non_empty(file.wiki.default_space.as_deref())),
            default_parent_page: value("WIKI_DEFAULT_PARENT_PAGE")
                .or_else(|| non_empty(file.wiki.default_parent_page.as_deref())),
            user_agent: value("WIKI_USER_AGENT")
                .or_else(|| non_empty(file.wiki.user_agent.as_deref()))
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            timeout_ms,
            chunk_size: file.wiki.chunk_size,
        })
    }

    /// Explicit value first, then the configured default space.
    pub fn space_key(&self, explicit: Option<&str>) -> Result<String> {
        non_empty(explicit)
            .or_else(|| self.default_space.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("a space key is required: pass --space or set WIKI_DEFAULT_SPACE")
            })
    }

    pub fn parent_page(&self, explicit: Option<&str>) -> Option<String> {
        non_empty(explicit).or_else(|| self.default_parent_page.clone())
    }
}

/// Load and parse a WikiConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WikiConfig> {
    if !config_path.exists() {
        return Ok(WikiConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WikiConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}
