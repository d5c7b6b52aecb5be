/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! User configuration: `<config_dir>/appshelf/config.toml` plus `APPSHELF_*`
//! environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const ENV_DATA_DIR: &str = "APPSHELF_DATA_DIR";
pub const ENV_CATALOG: &str = "APPSHELF_CATALOG";
pub const ENV_DEBOUNCE_MS: &str = "APPSHELF_DEBOUNCE_MS";
pub const ENV_MANIFEST_TIMEOUT_MS: &str = "APPSHELF_MANIFEST_TIMEOUT_MS";
pub const ENV_LOG: &str = "APPSHELF_LOG";

const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_MANIFEST_TIMEOUT_MS: u64 = 4_000;
const DEFAULT_CATALOG_TTL_SECS: u64 = 600;
const DEFAULT_MAX_RANKED: usize = 5;
const DEFAULT_SHARE_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_LOG_FILTER: &str = "info";
/// Upper bound for `debounce_ms`.
const MAX_DEBOUNCE_MS: u64 = 5_000;

pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("appshelf"))
}

pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("appshelf"))
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config: {e}"),
            Self::Parse(e) => write!(f, "failed to parse config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppshelfConfig {
    /// Directory holding `registry.redb`. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
    /// Remote catalog: a JSON file path or an http(s) URL template
    /// (`{chain_id}` is substituted).
    pub catalog: Option<String>,
    pub debounce_ms: u64,
    pub manifest_timeout_ms: u64,
    pub catalog_ttl_secs: u64,
    pub max_ranked: usize,
    pub share_base_url: String,
    pub log_filter: String,
}

impl Default for AppshelfConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            catalog: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            manifest_timeout_ms: DEFAULT_MANIFEST_TIMEOUT_MS,
            catalog_ttl_secs: DEFAULT_CATALOG_TTL_SECS,
            max_ranked: DEFAULT_MAX_RANKED,
            share_base_url: DEFAULT_SHARE_BASE_URL.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

fn parse_env_u64(key: &str, raw: &str) -> Option<u64> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {key}={raw:?}: {e}");
            None
        },
    }
}

impl AppshelfConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Load from `path` (or the default location when it exists), then apply
    /// environment overrides. Unreadable files fall back to defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let default_path = default_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME));
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| default_path.filter(|path| path.exists()));
        let mut config = match path {
            Some(path) => match Self::from_file(&path) {
                Ok(config) => {
                    debug!("Loaded config from {}", path.display());
                    config
                },
                Err(e) => {
                    warn!("Using default config; {}: {e}", path.display());
                    Self::default()
                },
            },
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validated()
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|dir| !dir.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(catalog) = lookup(ENV_CATALOG).filter(|catalog| !catalog.trim().is_empty()) {
            self.catalog = Some(catalog);
        }
        if let Some(ms) = lookup(ENV_DEBOUNCE_MS).and_then(|raw| parse_env_u64(ENV_DEBOUNCE_MS, &raw)) {
            self.debounce_ms = ms;
        }
        if let Some(ms) = lookup(ENV_MANIFEST_TIMEOUT_MS)
            .and_then(|raw| parse_env_u64(ENV_MANIFEST_TIMEOUT_MS, &raw))
        {
            self.manifest_timeout_ms = ms;
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|filter| !filter.trim().is_empty()) {
            self.log_filter = filter;
        }
    }

    /// Replace out-of-range values with their defaults.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            warn!(
                "debounce_ms={} exceeds {MAX_DEBOUNCE_MS}; using {}",
                self.debounce_ms, defaults.debounce_ms
            );
            self.debounce_ms = defaults.debounce_ms;
        }
        if self.manifest_timeout_ms == 0 {
            warn!("manifest_timeout_ms must be positive; using {}", defaults.manifest_timeout_ms);
            self.manifest_timeout_ms = defaults.manifest_timeout_ms;
        }
        if self.catalog_ttl_secs == 0 {
            warn!("catalog_ttl_secs must be positive; using {}", defaults.catalog_ttl_secs);
            self.catalog_ttl_secs = defaults.catalog_ttl_secs;
        }
        if !appshelf_core::is_valid_app_url(&self.share_base_url) {
            warn!(
                "share_base_url {:?} is not an http(s) URL; using {}",
                self.share_base_url, defaults.share_base_url
            );
            self.share_base_url = defaults.share_base_url;
        }
        self
    }

    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone().or_else(default_data_dir)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_millis(self.manifest_timeout_ms)
    }

    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AppshelfConfig::from_toml("debounce_ms = 150\ncatalog = \"apps.json\"\n").unwrap();
        assert_eq!(config.debounce_ms, 150);
        assert_eq!(config.catalog.as_deref(), Some("apps.json"));
        assert_eq!(config.manifest_timeout_ms, DEFAULT_MANIFEST_TIMEOUT_MS);
        assert_eq!(config.max_ranked, DEFAULT_MAX_RANKED);
    }

    #[test]
    fn unknown_types_are_parse_errors() {
        assert!(matches!(
            AppshelfConfig::from_toml("debounce_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_win_and_bad_numbers_are_ignored() {
        let env = HashMap::from([
            (ENV_DATA_DIR, "/tmp/appshelf"),
            (ENV_DEBOUNCE_MS, "not-a-number"),
            (ENV_MANIFEST_TIMEOUT_MS, "1500"),
            (ENV_LOG, "appshelf=debug"),
        ]);
        let mut config = AppshelfConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/appshelf")));
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert_eq!(config.manifest_timeout(), Duration::from_millis(1500));
        assert_eq!(config.log_filter, "appshelf=debug");
    }

    #[test]
    fn validated_resets_out_of_range_values() {
        let config = AppshelfConfig {
            debounce_ms: 60_000,
            manifest_timeout_ms: 0,
            catalog_ttl_secs: 0,
            share_base_url: "ftp://share".to_string(),
            ..AppshelfConfig::default()
        }
        .validated();
        assert_eq!(config, AppshelfConfig::default());
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "max_ranked = 3\n").unwrap();
        let config = AppshelfConfig::from_file(&path).unwrap();
        assert_eq!(config.max_ranked, 3);
        assert!(matches!(
            AppshelfConfig::from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
