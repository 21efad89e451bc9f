//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/tally/config.toml)
//! 3. Environment variables (TALLY_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::sync::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

/// Environment variable prefix
const ENV_PREFIX: &str = "TALLY";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (relational db, local search index)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Search index backend settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Full rebuild behaviour
    #[serde(default)]
    pub rebuild: RebuildConfig,

    /// Page size used when a read request doesn't specify one
    #[serde(default = "default_page_limit")]
    pub default_page_limit: usize,

    /// Upper bound accepted for a requested page size
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: usize,

    /// Log filter level (error, warn, info, debug, trace)
    #[serde(default)]
    pub log_level: Option<String>,
}

/// Which search index implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// SQLite + FTS5 database next to the relational store
    #[default]
    Sqlite,
    /// Remote Meilisearch server
    Meilisearch,
}

impl std::str::FromStr for IndexBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(IndexBackend::Sqlite),
            "meilisearch" | "meili" => Ok(IndexBackend::Meilisearch),
            other => anyhow::bail!("Unknown index backend: {}", other),
        }
    }
}

/// Search index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,

    /// Meilisearch host, e.g. `http://localhost:7700`
    #[serde(default)]
    pub url: Option<String>,

    /// Meilisearch API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// How long to wait for an enqueued Meilisearch task
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            url: None,
            api_key: None,
            task_timeout_ms: default_task_timeout_ms(),
        }
    }
}

/// Rebuild settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RebuildConfig {
    /// Abort the rebuild at the first failing entity type
    #[serde(default)]
    pub stop_on_error: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            index: IndexConfig::default(),
            rebuild: RebuildConfig::default(),
            default_page_limit: default_page_limit(),
            max_page_limit: default_max_page_limit(),
            log_level: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (TALLY_DATA_DIR, TALLY_INDEX_BACKEND, ...)
    /// 2. Config file (~/.config/tally/config.toml or TALLY_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // TALLY_DATA_DIR
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // TALLY_INDEX_BACKEND
        if let Ok(val) = std::env::var(format!("{}_INDEX_BACKEND", ENV_PREFIX)) {
            match val.parse() {
                Ok(backend) => self.index.backend = backend,
                Err(e) => tracing::warn!("Ignoring {}_INDEX_BACKEND: {}", ENV_PREFIX, e),
            }
        }

        // TALLY_INDEX_URL
        if let Ok(val) = std::env::var(format!("{}_INDEX_URL", ENV_PREFIX)) {
            self.index.url = if val.is_empty() { None } else { Some(val) };
        }

        // TALLY_INDEX_API_KEY
        if let Ok(val) = std::env::var(format!("{}_INDEX_API_KEY", ENV_PREFIX)) {
            self.index.api_key = if val.is_empty() { None } else { Some(val) };
        }

        // TALLY_LOG_LEVEL
        if let Ok(val) = std::env::var(format!("{}_LOG_LEVEL", ENV_PREFIX)) {
            self.log_level = if val.is_empty() { None } else { Some(val) };
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with TALLY_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally")
            .join("config.toml")
    }

    /// Get the path to the relational database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("tally.db")
    }

    /// Get the path to the local search index database
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("search.db")
    }

    /// Effective log level, defaulting to `warn`
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("warn")
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
}

fn default_page_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

fn default_max_page_limit() -> usize {
    MAX_PAGE_LIMIT
}

fn default_task_timeout_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "TALLY_DATA_DIR",
        "TALLY_INDEX_BACKEND",
        "TALLY_INDEX_URL",
        "TALLY_INDEX_API_KEY",
        "TALLY_LOG_LEVEL",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.index.backend, IndexBackend::Sqlite);
        assert!(config.index.url.is_none());
        assert!(!config.rebuild.stop_on_error);
        assert_eq!(config.default_page_limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(config.max_page_limit, MAX_PAGE_LIMIT);
        assert!(config.data_dir.ends_with("tally"));
        assert_eq!(config.log_level(), "warn");
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.database_path().ends_with("tally.db"));
        assert!(config.index_path().ends_with("search.db"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("TALLY_DATA_DIR", "/tmp/tally-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/tally-test"));
    }

    #[test]
    fn test_env_override_index_backend() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("TALLY_INDEX_BACKEND", "meilisearch");
        env::set_var("TALLY_INDEX_URL", "http://localhost:7700");
        config.apply_env_overrides();
        assert_eq!(config.index.backend, IndexBackend::Meilisearch);
        assert_eq!(config.index.url.as_deref(), Some("http://localhost:7700"));

        // Unknown backend is ignored
        env::set_var("TALLY_INDEX_BACKEND", "elastic");
        config.apply_env_overrides();
        assert_eq!(config.index.backend, IndexBackend::Meilisearch);

        // Empty string clears the url
        env::set_var("TALLY_INDEX_URL", "");
        config.apply_env_overrides();
        assert!(config.index.url.is_none());
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        config.data_dir = PathBuf::from("/data/tally");
        config.index.backend = IndexBackend::Meilisearch;
        config.index.url = Some("http://search:7700".to_string());
        config.rebuild.stop_on_error = true;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("[index]"));
        assert!(toml_str.contains("meilisearch"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.index.backend, IndexBackend::Meilisearch);
        assert_eq!(parsed.index.url, config.index.url);
        assert!(parsed.rebuild.stop_on_error);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            default_page_limit = 20

            [index]
            backend = "sqlite"

            [rebuild]
            stop_on_error = true
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.default_page_limit, 20);
        assert_eq!(config.max_page_limit, MAX_PAGE_LIMIT);
        assert_eq!(config.index.task_timeout_ms, 5_000);
        assert!(config.rebuild.stop_on_error);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("TALLY_DATA_DIR", temp_dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        // Should return defaults when file doesn't exist
        assert_eq!(config.index.backend, IndexBackend::Sqlite);
        assert!(config.data_dir.exists());
    }

    #[test]
    fn test_save_to_path_round_trip() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.data_dir = temp_dir.path().join("data");
        config.max_page_limit = 50;
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.data_dir, config.data_dir);
        assert_eq!(loaded.max_page_limit, 50);
    }
}
