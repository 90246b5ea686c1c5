use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::provider::ProviderId;

/// Configuration for a single provider (API key, optional endpoint override).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,

    /// Overrides [`ProviderId::default_base_url`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Tuning for the incremental city search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Queries shorter than this (after trimming) never hit the network.
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,

    /// Trailing-edge debounce window.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Minimum spacing between dispatched search requests.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,

    /// A request still pending after this long is logged, not aborted.
    #[serde(default = "default_soft_timeout_ms")]
    pub soft_timeout_ms: u64,

    #[serde(default = "default_min_population")]
    pub min_population: u64,

    #[serde(default = "default_result_limit")]
    pub result_limit: u32,
}

const fn default_min_query_chars() -> usize {
    2
}

const fn default_debounce_ms() -> u64 {
    250
}

const fn default_min_request_interval_ms() -> u64 {
    300
}

const fn default_soft_timeout_ms() -> u64 {
    5000
}

const fn default_min_population() -> u64 {
    10_000
}

const fn default_result_limit() -> u32 {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_query_chars: default_min_query_chars(),
            debounce_ms: default_debounce_ms(),
            min_request_interval_ms: default_min_request_interval_ms(),
            soft_timeout_ms: default_soft_timeout_ms(),
            min_population: default_min_population(),
            result_limit: default_result_limit(),
        }
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn soft_timeout(&self) -> Duration {
        Duration::from_millis(self.soft_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// OpenWeather unit system: "metric", "imperial" or "standard".
    #[serde(default = "default_units")]
    pub units: String,
}

fn default_units() -> String {
    "metric".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self { units: default_units() }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Example TOML:
    /// [providers.geodb]
    /// api_key = "..."
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub weather: WeatherConfig,
}

impl Config {
    /// Load config from the platform config dir, applying environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_from(&Self::config_file_path()?)?;
        cfg.apply_env_overrides(std::env::vars());
        Ok(cfg)
    }

    /// Load config from `path`, or return defaults if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weatherwise", "weatherwise")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Apply `WEATHERWISE_<PROVIDER>_API_KEY` variables on top of the file.
    pub fn apply_env_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(id) = ProviderId::all().iter().find(|id| id.env_var() == name) else {
                continue;
            };
            if !value.trim().is_empty() {
                self.upsert_provider_api_key(*id, value.trim().to_string());
            }
        }
    }

    /// Set or replace a provider API key, keeping any base URL override.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers
            .entry(provider_id.as_str().to_string())
            .and_modify(|cfg| cfg.api_key = api_key.clone())
            .or_insert(ProviderConfig { api_key, base_url: None });
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.provider_config(provider_id).map(|cfg| cfg.api_key.as_str())
    }

    /// Configured base URL, falling back to the provider default.
    pub fn provider_base_url(&self, provider_id: ProviderId) -> String {
        self.provider_config(provider_id)
            .and_then(|cfg| cfg.base_url.clone())
            .unwrap_or_else(|| provider_id.default_base_url().to_string())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some()
    }
}
