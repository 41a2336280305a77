use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::DEFAULT_TIMEOUT_SECS;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// A server missing heartbeats for this long drops out of listings
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub resolve_hostnames: bool,
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_true")]
    pub reap_enabled: bool,
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
    /// Stale rows are physically deleted once this old (never sooner than
    /// the registry timeout)
    #[serde(default = "default_reap_after")]
    pub reap_after_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Take the client address from X-Forwarded-For when present
    #[serde(default = "default_true")]
    pub trust_forwarded_for: bool,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_resolve_timeout() -> u64 {
    5
}

fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/metaserver/servers.db")
}

fn default_reap_interval() -> u64 {
    300
}

fn default_reap_after() -> u64 {
    3600
}

fn default_listen() -> String {
    "[::]:8080".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            resolve_hostnames: default_true(),
            resolve_timeout_secs: default_resolve_timeout(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            db_path: default_db_path(),
            reap_enabled: default_true(),
            reap_interval_secs: default_reap_interval(),
            reap_after_secs: default_reap_after(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            trust_forwarded_for: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.registry.timeout_secs, 1200);
        assert!(config.registry.resolve_hostnames);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.reap_after_secs, 3600);
        assert_eq!(config.api.listen, "[::]:8080");
        assert!(config.api.trust_forwarded_for);
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::parse(include_str!("../metaserverd.example.toml")).unwrap();
        assert_eq!(config.registry.timeout_secs, 1200);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.reap_interval_secs, 300);
    }

    #[test]
    fn test_partial_override() {
        let config = Config::parse(
            r#"
            [registry]
            timeout_secs = 90

            [store]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.registry.timeout_secs, 90);
        assert_eq!(config.registry.resolve_timeout_secs, 5);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.store.reap_enabled);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Config::parse("[store]\nbackend = \"mysql\"\n").is_err());
    }
}
