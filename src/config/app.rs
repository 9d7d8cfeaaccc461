//! Application configuration loaded from config.toml
//!
//! The file picks the persistence backend, tunes the ledger views and lists
//! the default categories seeded into an empty tenant. Every section is
//! optional; a missing file yields the defaults. A handful of environment
//! variables override individual values after the file is read.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Overrides the configuration file path.
pub const CONFIG_PATH_VAR: &str = "BUDGET_CONFIG";
/// Overrides `backend.base_url`.
pub const BACKEND_URL_VAR: &str = "BUDGET_BACKEND_URL";
/// Overrides `backend.data_dir`.
pub const DATA_DIR_VAR: &str = "BUDGET_DATA_DIR";
/// Sets `export_path`; the binary writes a JSON export there on exit.
pub const EXPORT_PATH_VAR: &str = "BUDGET_EXPORT_PATH";

/// Which persistence backend the session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Remote budget server over JSON/HTTP
    #[default]
    Http,
    /// Local `SQLite` files, one per tenant
    Sqlite,
    /// Process memory; nothing survives a restart
    Memory,
}

/// `[backend]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Which backend to build; defaults to HTTP
    pub kind: BackendKind,
    /// Server root for the HTTP backend
    pub base_url: String,
    /// Upper bound for every persistence call
    pub request_timeout_secs: u64,
    /// Directory holding the tenant databases of the `SQLite` backend
    pub data_dir: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 10,
            data_dir: PathBuf::from("data"),
        }
    }
}

/// `[ledger]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// How many entries the recent-expenses view shows
    pub recent_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            recent_limit: crate::core::aggregate::DEFAULT_RECENT_LIMIT,
        }
    }
}

/// One `[[categories]]` entry seeded into an empty tenant
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategorySeed {
    pub name: String,
    /// Monthly budget; must be positive like any created category
    pub budget: f64,
}

/// The whole config.toml file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub ledger: LedgerConfig,
    pub categories: Vec<CategorySeed>,
    /// Where to write a JSON export; only settable through the environment
    #[serde(skip)]
    pub export_path: Option<PathBuf>,
}

impl AppConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    /// Rejects values that would leave the session unusable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `request_timeout_secs` is zero, since every
    /// persistence call would time out before it starts.
    pub fn validate(&self) -> Result<()> {
        if self.backend.request_timeout_secs == 0 {
            return Err(Error::Config {
                message: "backend.request_timeout_secs must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Applies `BUDGET_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BACKEND_URL_VAR) {
            debug!(%url, "backend url overridden from environment");
            self.backend.base_url = url;
        }
        if let Some(dir) = lookup(DATA_DIR_VAR) {
            self.backend.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(EXPORT_PATH_VAR) {
            self.export_path = Some(PathBuf::from(path));
        }
    }
}

/// Parses and validates configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from `path`, falling back to defaults if it does not exist.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "no config file found, using defaults");
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;
    parse_config(&contents)
}

/// Loads the configuration the binary runs with: file from `BUDGET_CONFIG`
/// (or ./config.toml) plus environment overrides.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = match env::var(CONFIG_PATH_VAR) {
        Ok(path) => path,
        Err(env::VarError::NotPresent) => DEFAULT_CONFIG_PATH.to_string(),
        Err(e) => return Err(e.into()),
    };
    let mut config = load_config(&path)?;
    config.apply_overrides(|key| env::var(key).ok());
    info!(
        backend = ?config.backend.kind,
        seeds = config.categories.len(),
        "configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [backend]
            kind = "sqlite"
            data_dir = "ledgers"
            request_timeout_secs = 3

            [ledger]
            recent_limit = 8

            [[categories]]
            name = "Groceries"
            budget = 400.0

            [[categories]]
            name = "Rent"
            budget = 1200.0
        "#;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Sqlite);
        assert_eq!(config.backend.data_dir, PathBuf::from("ledgers"));
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        // Unset keys keep their defaults
        assert_eq!(config.backend.base_url, "http://localhost:5000");
        assert_eq!(config.ledger.recent_limit, 8);
        assert_eq!(config.categories.len(), 2);
        assert_eq!(config.categories[1].budget, 1200.0);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.ledger.recent_limit, 5);
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let err = parse_config("[backend]\nkind = \"carrier-pigeon\"").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_zero_timeout_is_rejected() -> Result<()> {
        let err = parse_config("[backend]\nrequest_timeout_secs = 0").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend]\nkind = \"memory\"\nrequest_timeout_secs = 0\n")?;
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        Ok(())
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config("does/not/exist/config.toml").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_config_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend]\nkind = \"memory\"\n")?;

        let config = load_config(&path)?;
        assert_eq!(config.backend.kind, BackendKind::Memory);
        Ok(())
    }

    #[test]
    fn test_environment_overrides() {
        let vars: HashMap<&str, &str> = [
            (BACKEND_URL_VAR, "http://budget.local:8080"),
            (EXPORT_PATH_VAR, "export.json"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.backend.base_url, "http://budget.local:8080");
        assert_eq!(config.backend.data_dir, PathBuf::from("data"));
        assert_eq!(config.export_path, Some(PathBuf::from("export.json")));
    }
}
