use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::api::cache::QueryCache;
use crate::api::client::TcisClient;
use crate::error::ApiError;
use crate::filters::FilterStore;
use crate::services::dashboard::Dashboard;
use crate::types::Config;
use crate::url_sync::{Address, FileAddress, UrlSynchronizer};
use crate::util::{tcis_home, write_atomic};

pub const ENV_API_BASE_URL: &str = "TCIS_API_BASE_URL";
pub const ENV_API_KEY: &str = "TCIS_API_KEY";

/// Everything a command needs: configuration, the filter store and the
/// cached backend view.
pub struct AppState {
    pub config: Config,
    pub filters: Arc<FilterStore>,
    pub dashboard: Dashboard,
    address: Arc<dyn Address>,
}

impl AppState {
    pub fn new(config: Config, address: Arc<dyn Address>) -> Result<Self, ApiError> {
        let client = Arc::new(TcisClient::new(&config)?);
        let cache = Arc::new(QueryCache::new(Duration::from_secs(config.cache_stale_secs)));

        Ok(Self {
            dashboard: Dashboard::new(client, cache),
            filters: Arc::new(FilterStore::new()),
            address,
            config,
        })
    }

    /// State backed by `~/.tcis`: config file plus persisted filters.
    pub fn load() -> Result<Self, ApiError> {
        let config = load_config()?;
        let address = Arc::new(FileAddress::default_location()?);
        Self::new(config, address)
    }

    /// Synchronizer between the filter store and the persisted query string.
    pub fn url_sync(&self) -> UrlSynchronizer {
        UrlSynchronizer::new(Arc::clone(&self.filters), Arc::clone(&self.address))
    }

    pub fn export_dir(&self) -> PathBuf {
        self.config
            .export_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Canonical config file path (~/.tcis/config.json)
pub fn config_path() -> Result<PathBuf, ApiError> {
    Ok(tcis_home()?.join("config.json"))
}

/// Load config from ~/.tcis/config.json, then apply environment overrides.
pub fn load_config() -> Result<Config, ApiError> {
    let mut config = load_config_from(&config_path()?)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// A missing file yields defaults; an unreadable or malformed one is an error.
pub fn load_config_from(path: &Path) -> Result<Config, ApiError> {
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ApiError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

    serde_json::from_str(&content)
        .map_err(|e| ApiError::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

pub fn save_config(path: &Path, config: &Config) -> Result<(), ApiError> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ApiError::Config(format!("Failed to serialize config: {}", e)))?;
    write_atomic(path, content.as_bytes())
}

/// Load, mutate and write back the config file. A missing file starts from
/// defaults.
pub fn update_config_file(
    path: &Path,
    mutator: impl FnOnce(&mut Config),
) -> Result<Config, ApiError> {
    let mut config = load_config_from(path)?;
    mutator(&mut config);
    save_config(path, &config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(ENV_API_BASE_URL).filter(|v| !v.trim().is_empty()) {
        config.api_base_url = url;
    }
    if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
        config.api_key = Some(key);
    }
}
