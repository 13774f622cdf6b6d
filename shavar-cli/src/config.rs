//! Configuration loading for shavar-sync.
//!
//! Configuration is loaded from a TOML file given with `--config`. Every
//! section and field is optional; missing values fall back to defaults.

use serde::Deserialize;
use shavar_client::engine::{
    DEFAULT_APP_VERSION, DEFAULT_BASE_URL, DEFAULT_CLIENT, DEFAULT_PROTOCOL_VERSION,
};
use shavar_client::runner::DEFAULT_POLL_INTERVAL_SECS;
use shavar_client::{RunnerConfig, SyncConfig};
use shavar_types::ListName;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for shavar-sync.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// List server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Lists to keep in sync.
    #[serde(default)]
    pub lists: ListsConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Background runner configuration.
    #[serde(default)]
    pub runner: RunnerSettings,
}

/// List server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Endpoint prefix (default: the public Safe Browsing v2 endpoint).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// `client` query parameter (default: api).
    #[serde(default = "default_client")]
    pub client: String,
    /// API key. Required for `update` and `run`.
    #[serde(default)]
    pub api_key: String,
    /// `appver` query parameter (default: 1.5.2).
    #[serde(default = "default_app_version")]
    pub app_version: String,
    /// `pver` query parameter (default: 2.2).
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Bound on each HTTP exchange in seconds (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Lists to keep in sync.
#[derive(Debug, Clone, Deserialize)]
pub struct ListsConfig {
    /// List names, in request order.
    #[serde(default = "default_list_names")]
    pub names: Vec<String>,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file (default: under the user data dir).
    pub database: Option<PathBuf>,
}

/// Background runner configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSettings {
    /// Seconds between ticks (default: 60).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Enable the runner (default: true).
    #[serde(default = "default_runner_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_client() -> String {
    DEFAULT_CLIENT.to_string()
}

fn default_app_version() -> String {
    DEFAULT_APP_VERSION.to_string()
}

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_list_names() -> Vec<String> {
    vec![
        "goog-malware-shavar".to_string(),
        "googpub-phish-shavar".to_string(),
    ]
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_runner_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            client: default_client(),
            api_key: String::new(),
            app_version: default_app_version(),
            protocol_version: default_protocol_version(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ListsConfig {
    fn default() -> Self {
        Self {
            names: default_list_names(),
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            enabled: default_runner_enabled(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Configured list names.
    pub fn list_names(&self) -> Vec<ListName> {
        self.lists.names.iter().map(|n| ListName::new(n.as_str())).collect()
    }

    /// Engine configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            base_url: self.server.base_url.clone(),
            client: self.server.client.clone(),
            api_key: self.server.api_key.clone(),
            app_version: self.server.app_version.clone(),
            protocol_version: self.server.protocol_version.clone(),
            lists: self.list_names(),
            request_timeout: Duration::from_secs(self.server.request_timeout_secs),
        }
    }

    /// Runner configuration.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            poll_interval_secs: self.runner.poll_interval_secs,
            enabled: self.runner.enabled,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.server.client, "api");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.lists.names.len(), 2);
        assert!(config.storage.database.is_none());
        assert!(config.runner.enabled);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
base_url = "http://localhost:8080/safebrowsing/"
api_key = "abc123"
request_timeout_secs = 5

[lists]
names = ["goog-malware-shavar"]

[storage]
database = "/data/shavar.db"

[runner]
poll_interval_secs = 300
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.base_url, "http://localhost:8080/safebrowsing/");
        assert_eq!(config.server.api_key, "abc123");
        assert_eq!(config.server.app_version, "1.5.2");
        assert_eq!(config.lists.names, vec!["goog-malware-shavar"]);
        assert_eq!(config.storage.database, Some(PathBuf::from("/data/shavar.db")));
        assert_eq!(config.runner.poll_interval_secs, 300);
        assert!(config.runner.enabled);
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.protocol_version, "2.2");
        assert_eq!(config.runner.poll_interval_secs, 60);
        assert_eq!(config.lists.names, default_list_names());
    }

    #[test]
    fn sync_config_carries_server_settings() {
        let toml = r#"
[server]
api_key = "k"
request_timeout_secs = 7

[lists]
names = ["a-list", "b-list"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sync = config.sync_config();

        assert_eq!(sync.api_key, "k");
        assert_eq!(sync.request_timeout, Duration::from_secs(7));
        assert_eq!(sync.lists, vec![ListName::from("a-list"), ListName::from("b-list")]);
        assert!(sync.url("downloads").contains("apikey=k"));
    }

    #[test]
    fn from_file_reports_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::from_file(&missing),
            Err(ConfigError::ReadError { .. })
        ));

        let bad = dir.path().join("bad.toml");
        let mut file = std::fs::File::create(&bad).unwrap();
        writeln!(file, "[server]\nrequest_timeout_secs = \"soon\"").unwrap();
        let err = Config::from_file(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }
}
