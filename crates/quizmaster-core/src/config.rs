//! Client configuration management.
//!
//! Configuration is stored at `~/.config/quizmaster/config.json` and can be
//! overridden from the environment:
//!
//! - `QUIZMASTER_API_URL`
//! - `QUIZMASTER_TIMEOUT_SECS`
//! - `QUIZMASTER_STORAGE` (`file`, `keyring` or `memory`)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{FileStorage, KeyringStorage, MemoryStorage, StorageBackend};
use crate::router::RouteTable;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "quizmaster";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// HTTP request timeout in seconds. Applies to every call, exports included.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where the session entries are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown storage kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub storage: StorageKind,
    /// Where exports are saved. Defaults to the user's download directory.
    pub download_dir: Option<PathBuf>,
    /// JSON route table replacing the built-in one.
    pub routes_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            storage: StorageKind::default(),
            download_dir: None,
            routes_file: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults when absent), then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from `lookup`. Unparseable values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("QUIZMASTER_API_URL").filter(|url| !url.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup("QUIZMASTER_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout_secs = secs,
                _ => warn!(value = %raw, "Ignoring invalid QUIZMASTER_TIMEOUT_SECS"),
            }
        }
        if let Some(raw) = lookup("QUIZMASTER_STORAGE") {
            match raw.parse() {
                Ok(kind) => self.storage = kind,
                Err(e) => warn!(error = %e, "Ignoring invalid QUIZMASTER_STORAGE"),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Holds the session file and the log files.
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// The storage backend selected by `storage`.
    pub fn storage_backend(&self) -> Result<Box<dyn StorageBackend>> {
        Ok(match self.storage {
            StorageKind::File => Box::new(FileStorage::new(Self::cache_dir()?)),
            StorageKind::Keyring => Box::new(KeyringStorage::new()),
            StorageKind::Memory => Box::new(MemoryStorage::new()),
        })
    }

    pub fn route_table(&self) -> Result<RouteTable> {
        match self.routes_file {
            Some(ref path) => RouteTable::load(path),
            None => Ok(RouteTable::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:5000/api");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.storage, StorageKind::File);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"storage": "keyring"}"#).unwrap();
        assert_eq!(config.storage, StorageKind::Keyring);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("QUIZMASTER_API_URL", "https://quiz.example.com/api"),
            ("QUIZMASTER_TIMEOUT_SECS", "5"),
            ("QUIZMASTER_STORAGE", "memory"),
        ]));
        assert_eq!(config.api_base_url, "https://quiz.example.com/api");
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.storage, StorageKind::Memory);
    }

    #[test]
    fn test_invalid_env_values_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("QUIZMASTER_TIMEOUT_SECS", "soon"),
            ("QUIZMASTER_STORAGE", "floppy"),
            ("QUIZMASTER_API_URL", "  "),
        ]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_route_table_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(
            &path,
            r#"[
                {"path": "/login", "name": "Login", "meta": {"requiresGuest": true}},
                {"path": "/dashboard", "name": "Dashboard", "meta": {"requiresAuth": true}},
                {"path": "/admin", "name": "AdminDashboard", "meta": {"requiresAuth": true, "requiresAdmin": true}}
            ]"#,
        )
        .unwrap();
        let config = Config {
            routes_file: Some(path),
            ..Default::default()
        };
        assert_eq!(config.route_table().unwrap().iter().count(), 3);
    }
}
