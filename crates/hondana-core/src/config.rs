use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::HondanaError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub http: HttpConfig,
    pub trackers: TrackersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackersConfig {
    pub anilist: AniListConfig,
    pub mal: MalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AniListConfig {
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MalConfig {
    pub client_id: String,
    pub redirect_uri: Option<String>,
}

impl HttpConfig {
    /// Request timeout, or `None` when disabled with `timeout_secs = 0`.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl AppConfig {
    /// Load config: user file (if exists) merged over built-in defaults.
    pub fn load() -> Result<Self, HondanaError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            tracing::debug!(path = %user_path.display(), "loading user config");
            let user_str = std::fs::read_to_string(&user_path)?;
            Self::from_user_toml(&user_str)
        } else {
            Self::from_user_toml("")
        }
    }

    /// Parse a user config, taking every key it leaves out from the defaults.
    pub fn from_user_toml(user: &str) -> Result<Self, HondanaError> {
        let parse = |s: &str| {
            toml::from_str::<toml::Table>(s).map_err(|e| HondanaError::Config(e.to_string()))
        };
        let mut merged = parse(DEFAULT_CONFIG)?;
        overlay(&mut merged, parse(user)?);
        toml::Value::Table(merged)
            .try_into::<AppConfig>()
            .map_err(|e| HondanaError::Config(e.to_string()))
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the database file.
    pub fn db_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("hondana.db"))
            .unwrap_or_else(|| PathBuf::from("hondana.db"))
    }

    /// Ensure the data directory exists and return the DB path.
    pub fn ensure_db_path() -> Result<PathBuf, HondanaError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "hondana")
    }
}

/// Recursively copy `user` into `base`; nested tables merge key by key.
fn overlay(base: &mut toml::Table, user: toml::Table) {
    for (key, value) in user {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(user_table)) => {
                overlay(base_table, user_table)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = AppConfig::default();
        assert_eq!(config.general.log_filter, "hondana=info");
        assert_eq!(config.http.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.trackers.anilist.client_id, "5631");
        assert_eq!(
            config.trackers.mal.redirect_uri.as_deref(),
            Some("hondana://auth/mal")
        );
    }

    #[test]
    fn test_roundtrip() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.http.timeout_secs, config.http.timeout_secs);
        assert_eq!(
            deserialized.trackers.mal.client_id,
            config.trackers.mal.client_id
        );
    }

    #[test]
    fn test_partial_user_file_keeps_defaults() {
        let config = AppConfig::from_user_toml(
            r#"
            [trackers.mal]
            client_id = "my-client"
            "#,
        )
        .unwrap();
        assert_eq!(config.trackers.mal.client_id, "my-client");
        assert_eq!(
            config.trackers.mal.redirect_uri.as_deref(),
            Some("hondana://auth/mal")
        );
        assert_eq!(config.trackers.anilist.client_id, "5631");
        assert_eq!(config.general.log_filter, "hondana=info");
        assert_eq!(config.http.timeout_secs, 30);
    }

    #[test]
    fn test_empty_user_file_is_default() {
        let config = AppConfig::from_user_toml("").unwrap();
        assert_eq!(config.http.timeout_secs, AppConfig::default().http.timeout_secs);
    }

    #[test]
    fn test_bad_user_value_is_config_error() {
        let result = AppConfig::from_user_toml("[http]\ntimeout_secs = \"soon\"\n");
        assert!(matches!(result, Err(HondanaError::Config(_))));
    }

    #[test]
    fn test_zero_timeout_disables() {
        let http = HttpConfig { timeout_secs: 0 };
        assert!(http.timeout().is_none());
    }
}
