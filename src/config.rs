use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::EvictionPolicy;
use crate::documents::CacheSettings;

const APP_NAME: &str = "docstash";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Base URL of the document API, e.g. https://school.example/api/v1
  pub url: Option<String>,
  pub request_timeout_secs: u64,
  /// Start without network access
  pub offline: bool,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: None,
      request_timeout_secs: 30,
      offline: false,
    }
  }
}

/// Backend for the metadata cache
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
  /// SQLite file under the data directory, survives restarts
  #[default]
  Sqlite,
  /// Process-local map, gone on exit
  Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub storage: StorageKind,
  /// Prefix shared by every metadata key
  pub namespace: String,
  /// Assumed capacity of the metadata backend, in bytes
  pub capacity_bytes: u64,
  /// Downloads above this size are not kept for offline use
  pub max_persist_bytes: u64,
  pub list_ttl_minutes: i64,
  pub document_ttl_minutes: i64,
  pub fallback_ttl_minutes: i64,
  pub high_water_percent: f64,
  pub proactive_target_percent: f64,
  pub reactive_target_percent: f64,
  pub data_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    let settings = CacheSettings::default();
    let policy = EvictionPolicy::new("docstash_cache_", 5 * 1024 * 1024);
    Self {
      storage: StorageKind::default(),
      namespace: policy.namespace,
      capacity_bytes: policy.capacity,
      max_persist_bytes: settings.max_persist_bytes,
      list_ttl_minutes: settings.list_ttl_minutes,
      document_ttl_minutes: settings.document_ttl_minutes,
      fallback_ttl_minutes: settings.fallback_ttl_minutes,
      high_water_percent: policy.high_water_percent,
      proactive_target_percent: policy.proactive_target_percent,
      reactive_target_percent: policy.reactive_target_percent,
      data_dir: None,
    }
  }
}

impl CacheConfig {
  pub fn settings(&self) -> CacheSettings {
    CacheSettings {
      list_ttl_minutes: self.list_ttl_minutes,
      document_ttl_minutes: self.document_ttl_minutes,
      fallback_ttl_minutes: self.fallback_ttl_minutes,
      max_persist_bytes: self.max_persist_bytes,
    }
  }

  pub fn eviction_policy(&self) -> EvictionPolicy {
    EvictionPolicy {
      high_water_percent: self.high_water_percent,
      proactive_target_percent: self.proactive_target_percent,
      reactive_target_percent: self.reactive_target_percent,
      ..EvictionPolicy::new(self.namespace.clone(), self.capacity_bytes)
    }
  }

  /// Directory holding the cache databases and the log file.
  pub fn data_dir(&self) -> Result<PathBuf> {
    match &self.data_dir {
      Some(dir) => Ok(dir.clone()),
      None => dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .ok_or_else(|| eyre!("Could not determine a data directory, set cache.data_dir")),
    }
  }

  fn validate(&self) -> Result<()> {
    if self.capacity_bytes == 0 {
      return Err(eyre!("cache.capacity_bytes must be greater than zero"));
    }
    let ordered = 0.0 < self.reactive_target_percent
      && self.reactive_target_percent <= self.proactive_target_percent
      && self.proactive_target_percent < self.high_water_percent
      && self.high_water_percent <= 100.0;
    if !ordered {
      return Err(eyre!(
        "cache thresholds must satisfy 0 < reactive_target <= proactive_target < high_water <= 100"
      ));
    }
    let ttls = [
      self.list_ttl_minutes,
      self.document_ttl_minutes,
      self.fallback_ttl_minutes,
    ];
    if ttls.iter().any(|&ttl| ttl <= 0) {
      return Err(eyre!("cache TTLs must be positive"));
    }
    Ok(())
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./docstash.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/docstash/config.yaml
  ///
  /// Without a file the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.cache.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(format!("{}.yaml", APP_NAME));
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join(APP_NAME).join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Resolve the API base URL.
  ///
  /// The command line wins over the config file.
  pub fn api_url(&self, override_url: Option<&str>) -> Result<String> {
    override_url
      .map(str::to_string)
      .or_else(|| self.api.url.clone())
      .ok_or_else(|| {
        eyre!(
          "No API URL configured. Set api.url in {}.yaml, pass --api-url or set DOCSTASH_API_URL.",
          APP_NAME
        )
      })
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.api.request_timeout_secs)
  }

  /// Get the API token from the environment, if any.
  ///
  /// Checks DOCSTASH_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("DOCSTASH_API_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}
